use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use super::{count_referencing, exists, Speaker, UserType, WriteTx};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct NewSpeaker {
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub title: String,
    pub speaker_type: UserType,
}

#[derive(Debug, Clone, Default)]
pub struct SpeakerPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<Option<String>>,
    pub title: Option<String>,
    pub speaker_type: Option<UserType>,
}

impl SpeakerPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.bio.is_none()
            && self.title.is_none()
            && self.speaker_type.is_none()
    }
}

#[derive(Clone)]
pub struct SpeakerManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> SpeakerManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl SpeakerManager<'_> {
    pub async fn list(&self) -> Result<Vec<Speaker>> {
        Ok(sqlx::query_as::<_, Speaker>("SELECT * FROM Speaker ORDER BY id")
            .fetch_all(self.pool)
            .await?)
    }

    pub async fn get(&self, id: i64) -> Result<Speaker> {
        sqlx::query_as::<_, Speaker>("SELECT * FROM Speaker WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("speaker", id))
    }

    pub async fn by_ids(&self, ids: &[i64]) -> Result<Vec<Speaker>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM Speaker WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        Ok(builder
            .build_query_as::<Speaker>()
            .fetch_all(self.pool)
            .await?)
    }

    pub async fn create(&self, speaker: &NewSpeaker) -> Result<Speaker> {
        let created = sqlx::query_as::<_, Speaker>(
            "INSERT INTO Speaker(first_name, last_name, bio, title, type) VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&speaker.first_name)
        .bind(&speaker.last_name)
        .bind(&speaker.bio)
        .bind(&speaker.title)
        .bind(speaker.speaker_type)
        .fetch_one(self.pool)
        .await?;

        info!(
            "created speaker {} ({} {})",
            created.id, created.first_name, created.last_name
        );
        Ok(created)
    }

    pub async fn update(&self, id: i64, patch: SpeakerPatch) -> Result<Speaker> {
        if patch.is_empty() {
            return self.get(id).await;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE Speaker SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(first_name) = patch.first_name {
                fields.push("first_name = ").push_bind_unseparated(first_name);
            }
            if let Some(last_name) = patch.last_name {
                fields.push("last_name = ").push_bind_unseparated(last_name);
            }
            if let Some(bio) = patch.bio {
                fields.push("bio = ").push_bind_unseparated(bio);
            }
            if let Some(title) = patch.title {
                fields.push("title = ").push_bind_unseparated(title);
            }
            if let Some(speaker_type) = patch.speaker_type {
                fields.push("type = ").push_bind_unseparated(speaker_type);
            }
        }
        builder.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let updated = builder
            .build_query_as::<Speaker>()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("speaker", id))?;

        info!("updated speaker {id}");
        Ok(updated)
    }

    /// Refuses while any chapel session is assigned to the speaker.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = WriteTx::begin(self.pool).await?;

        if !exists(&mut *tx, "Speaker", id).await? {
            return Err(Error::not_found("speaker", id));
        }

        let sessions = count_referencing(&mut *tx, "ChapelSession", "speaker_id", id).await?;
        if sessions > 0 {
            return Err(Error::Conflict(format!(
                "speaker {id} is still assigned to {sessions} chapel sessions"
            )));
        }

        sqlx::query("DELETE FROM Speaker WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("deleted speaker {id}");
        Ok(())
    }
}
