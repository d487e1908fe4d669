use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use super::chapel_manager::ChapelSessionManager;
use super::user_manager::UserManager;
use super::{exists, ChapelSessionDetail, Feedback, FeedbackDetail, User, WriteTx};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub stars: i64,
    pub response: Option<String>,
    pub user_id: i64,
    pub chapel_session_id: i64,
}

/// Only the rating, the response and the session can change after submission.
#[derive(Debug, Clone, Default)]
pub struct FeedbackPatch {
    pub stars: Option<i64>,
    pub response: Option<Option<String>>,
    pub chapel_session_id: Option<i64>,
}

impl FeedbackPatch {
    pub fn is_empty(&self) -> bool {
        self.stars.is_none() && self.response.is_none() && self.chapel_session_id.is_none()
    }
}

/// Which relations to attach when reading feedback.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackRelations {
    /// The session, along with its speaker.
    pub session: bool,
    pub author: bool,
}

impl FeedbackRelations {
    pub fn any(&self) -> bool {
        self.session || self.author
    }
}

#[derive(Clone)]
pub struct FeedbackManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> FeedbackManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl FeedbackManager<'_> {
    pub async fn list(&self) -> Result<Vec<Feedback>> {
        Ok(sqlx::query_as::<_, Feedback>("SELECT * FROM Feedback ORDER BY id")
            .fetch_all(self.pool)
            .await?)
    }

    pub async fn get(&self, id: i64) -> Result<Feedback> {
        sqlx::query_as::<_, Feedback>("SELECT * FROM Feedback WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("feedback", id))
    }

    pub async fn list_for_session(&self, chapel_session_id: i64) -> Result<Vec<Feedback>> {
        let mut conn = self.pool.acquire().await?;
        if !exists(&mut *conn, "ChapelSession", chapel_session_id).await? {
            return Err(Error::not_found("chapel session", chapel_session_id));
        }

        Ok(sqlx::query_as::<_, Feedback>(
            "SELECT * FROM Feedback WHERE chapel_session_id = ? ORDER BY id",
        )
        .bind(chapel_session_id)
        .fetch_all(&mut *conn)
        .await?)
    }

    /// Feedback filed under a different session is reported as not found.
    pub async fn get_for_session(&self, chapel_session_id: i64, id: i64) -> Result<Feedback> {
        let feedback = self.get(id).await?;
        if feedback.chapel_session_id != chapel_session_id {
            return Err(Error::NotFound(format!(
                "feedback {id} not found for chapel session {chapel_session_id}"
            )));
        }
        Ok(feedback)
    }

    /// Attaches the requested relations, one batched query per relation.
    pub async fn with_relations(
        &self,
        feedback: Vec<Feedback>,
        relations: FeedbackRelations,
    ) -> Result<Vec<FeedbackDetail>> {
        let mut sessions: HashMap<i64, ChapelSessionDetail> = HashMap::new();
        if relations.session {
            let mut ids: Vec<i64> = feedback.iter().map(|f| f.chapel_session_id).collect();
            ids.sort_unstable();
            ids.dedup();

            let manager = ChapelSessionManager::new(self.pool);
            let found = manager.by_ids(&ids).await?;
            sessions = manager
                .with_speakers(found)
                .await?
                .into_iter()
                .map(|detail| (detail.session.id, detail))
                .collect();
        }

        let mut authors: HashMap<i64, User> = HashMap::new();
        if relations.author {
            let mut ids: Vec<i64> = feedback.iter().map(|f| f.user_id).collect();
            ids.sort_unstable();
            ids.dedup();

            authors = UserManager::new(self.pool)
                .by_ids(&ids)
                .await?
                .into_iter()
                .map(|user| (user.id, user))
                .collect();
        }

        Ok(feedback
            .into_iter()
            .map(|feedback| FeedbackDetail {
                chapel_session: sessions.get(&feedback.chapel_session_id).cloned(),
                author: authors.get(&feedback.user_id).cloned(),
                feedback,
            })
            .collect())
    }

    pub async fn create(&self, feedback: &NewFeedback) -> Result<Feedback> {
        let mut tx = WriteTx::begin(self.pool).await?;

        if !exists(&mut *tx, "ChapelSession", feedback.chapel_session_id).await? {
            return Err(Error::missing_reference(
                "chapel session",
                feedback.chapel_session_id,
            ));
        }
        if !exists(&mut *tx, "User", feedback.user_id).await? {
            return Err(Error::missing_reference("user", feedback.user_id));
        }

        let created = sqlx::query_as::<_, Feedback>(
            "INSERT INTO Feedback(stars, response, user_id, chapel_session_id) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(feedback.stars)
        .bind(&feedback.response)
        .bind(feedback.user_id)
        .bind(feedback.chapel_session_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            "user {} left {} stars on chapel session {}",
            created.user_id, created.stars, created.chapel_session_id
        );
        Ok(created)
    }

    pub async fn update(&self, id: i64, patch: FeedbackPatch) -> Result<Feedback> {
        let mut tx = WriteTx::begin(self.pool).await?;

        let current = sqlx::query_as::<_, Feedback>("SELECT * FROM Feedback WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("feedback", id))?;

        if patch.is_empty() {
            return Ok(current);
        }

        if let Some(chapel_session_id) = patch.chapel_session_id {
            if !exists(&mut *tx, "ChapelSession", chapel_session_id).await? {
                return Err(Error::missing_reference("chapel session", chapel_session_id));
            }
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE Feedback SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(stars) = patch.stars {
                fields.push("stars = ").push_bind_unseparated(stars);
            }
            if let Some(response) = patch.response {
                fields.push("response = ").push_bind_unseparated(response);
            }
            if let Some(chapel_session_id) = patch.chapel_session_id {
                fields
                    .push("chapel_session_id = ")
                    .push_bind_unseparated(chapel_session_id);
            }
        }
        builder.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let updated = builder
            .build_query_as::<Feedback>()
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("updated feedback {id}");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM Feedback WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("feedback", id));
        }

        info!("deleted feedback {id}");
        Ok(())
    }
}
