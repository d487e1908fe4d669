use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use super::speaker_manager::SpeakerManager;
use super::{count_referencing, exists, ChapelSession, ChapelSessionDetail, WriteTx};
use crate::error::{Error, Result};
use crate::validate;

#[derive(Debug, Clone)]
pub struct NewChapelSession {
    pub topic: String,
    pub scripture: Option<String>,
    pub date: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub number_standings: Option<i64>,
    pub speaker_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ChapelSessionPatch {
    pub topic: Option<String>,
    pub scripture: Option<Option<String>>,
    pub date: Option<DateTime<Utc>>,
    pub end_time: Option<Option<DateTime<Utc>>>,
    pub number_standings: Option<Option<i64>>,
    pub speaker_id: Option<Option<i64>>,
}

impl ChapelSessionPatch {
    pub fn is_empty(&self) -> bool {
        self.topic.is_none()
            && self.scripture.is_none()
            && self.date.is_none()
            && self.end_time.is_none()
            && self.number_standings.is_none()
            && self.speaker_id.is_none()
    }
}

#[derive(Clone)]
pub struct ChapelSessionManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> ChapelSessionManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl ChapelSessionManager<'_> {
    pub async fn list(&self) -> Result<Vec<ChapelSession>> {
        Ok(
            sqlx::query_as::<_, ChapelSession>("SELECT * FROM ChapelSession ORDER BY date, id")
                .fetch_all(self.pool)
                .await?,
        )
    }

    pub async fn get(&self, id: i64) -> Result<ChapelSession> {
        sqlx::query_as::<_, ChapelSession>("SELECT * FROM ChapelSession WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("chapel session", id))
    }

    pub async fn by_ids(&self, ids: &[i64]) -> Result<Vec<ChapelSession>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT * FROM ChapelSession WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        Ok(builder
            .build_query_as::<ChapelSession>()
            .fetch_all(self.pool)
            .await?)
    }

    /// Attaches each session's speaker, fetched in a single query.
    pub async fn with_speakers(
        &self,
        sessions: Vec<ChapelSession>,
    ) -> Result<Vec<ChapelSessionDetail>> {
        let mut ids: Vec<i64> = sessions.iter().filter_map(|s| s.speaker_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let speakers: HashMap<_, _> = SpeakerManager::new(self.pool)
            .by_ids(&ids)
            .await?
            .into_iter()
            .map(|speaker| (speaker.id, speaker))
            .collect();

        Ok(sessions
            .into_iter()
            .map(|session| ChapelSessionDetail {
                speaker: session.speaker_id.and_then(|id| speakers.get(&id).cloned()),
                session,
            })
            .collect())
    }

    pub async fn create(&self, session: &NewChapelSession) -> Result<ChapelSession> {
        validate::time_order(session.date, session.end_time)?;

        let mut tx = WriteTx::begin(self.pool).await?;

        if let Some(speaker_id) = session.speaker_id {
            if !exists(&mut *tx, "Speaker", speaker_id).await? {
                return Err(Error::missing_reference("speaker", speaker_id));
            }
        }

        let created = sqlx::query_as::<_, ChapelSession>(
            "INSERT INTO ChapelSession(topic, scripture, date, end_time, number_standings, speaker_id)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&session.topic)
        .bind(&session.scripture)
        .bind(session.date)
        .bind(session.end_time)
        .bind(session.number_standings)
        .bind(session.speaker_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("created chapel session {} ({})", created.id, created.topic);
        Ok(created)
    }

    /// Time ordering is checked against the merged row, so moving only `date`
    /// past an existing `end_time` is rejected too.
    pub async fn update(&self, id: i64, patch: ChapelSessionPatch) -> Result<ChapelSession> {
        let mut tx = WriteTx::begin(self.pool).await?;

        let current = sqlx::query_as::<_, ChapelSession>("SELECT * FROM ChapelSession WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("chapel session", id))?;

        if patch.is_empty() {
            return Ok(current);
        }

        if patch.date.is_some() || patch.end_time.is_some() {
            validate::time_order(
                patch.date.unwrap_or(current.date),
                patch.end_time.unwrap_or(current.end_time),
            )?;
        }

        if let Some(Some(speaker_id)) = patch.speaker_id {
            if !exists(&mut *tx, "Speaker", speaker_id).await? {
                return Err(Error::missing_reference("speaker", speaker_id));
            }
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ChapelSession SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(topic) = patch.topic {
                fields.push("topic = ").push_bind_unseparated(topic);
            }
            if let Some(scripture) = patch.scripture {
                fields.push("scripture = ").push_bind_unseparated(scripture);
            }
            if let Some(date) = patch.date {
                fields.push("date = ").push_bind_unseparated(date);
            }
            if let Some(end_time) = patch.end_time {
                fields.push("end_time = ").push_bind_unseparated(end_time);
            }
            if let Some(number_standings) = patch.number_standings {
                fields
                    .push("number_standings = ")
                    .push_bind_unseparated(number_standings);
            }
            if let Some(speaker_id) = patch.speaker_id {
                fields.push("speaker_id = ").push_bind_unseparated(speaker_id);
            }
        }
        builder.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let updated = builder
            .build_query_as::<ChapelSession>()
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("updated chapel session {id}");
        Ok(updated)
    }

    /// Refuses while feedback about the session exists.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = WriteTx::begin(self.pool).await?;

        if !exists(&mut *tx, "ChapelSession", id).await? {
            return Err(Error::not_found("chapel session", id));
        }

        let feedback = count_referencing(&mut *tx, "Feedback", "chapel_session_id", id).await?;
        if feedback > 0 {
            return Err(Error::Conflict(format!(
                "chapel session {id} still has {feedback} feedback entries"
            )));
        }

        sqlx::query("DELETE FROM ChapelSession WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("deleted chapel session {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    fn new_session(speaker_id: Option<i64>) -> NewChapelSession {
        NewChapelSession {
            topic: "Grace".into(),
            scripture: Some("Ephesians 2:8".into()),
            date: morning(),
            end_time: Some(morning() + Duration::hours(1)),
            number_standings: Some(0),
            speaker_id,
        }
    }

    #[sqlx::test(fixtures("speakers"))]
    async fn ok_create_session_with_speaker(pool: sqlx::SqlitePool) {
        let manager = ChapelSessionManager::new(&pool);
        let created = manager.create(&new_session(Some(1))).await.unwrap();

        assert_eq!(manager.get(created.id).await.unwrap(), created);
        assert_eq!(created.date, morning());
    }

    #[sqlx::test]
    async fn unknown_speaker_is_rejected(pool: sqlx::SqlitePool) {
        let err = ChapelSessionManager::new(&pool)
            .create(&new_session(Some(7)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
    }

    #[sqlx::test]
    async fn end_before_date_is_rejected(pool: sqlx::SqlitePool) {
        let mut session = new_session(None);
        session.end_time = Some(morning() - Duration::hours(1));

        let err = ChapelSessionManager::new(&pool)
            .create(&session)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[sqlx::test(fixtures("speakers", "chapel_sessions"))]
    async fn moving_date_past_end_time_is_rejected(pool: sqlx::SqlitePool) {
        let manager = ChapelSessionManager::new(&pool);
        let current = manager.get(1).await.unwrap();
        let end_time = current.end_time.unwrap();

        let err = manager
            .update(
                1,
                ChapelSessionPatch {
                    date: Some(end_time + Duration::minutes(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(manager.get(1).await.unwrap(), current);
    }

    #[sqlx::test(fixtures("speakers", "chapel_sessions"))]
    async fn speaker_can_be_unassigned(pool: sqlx::SqlitePool) {
        let updated = ChapelSessionManager::new(&pool)
            .update(
                1,
                ChapelSessionPatch {
                    speaker_id: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.speaker_id, None);
    }

    #[sqlx::test(fixtures("speakers", "chapel_sessions"))]
    async fn with_speakers_attaches_assigned_speaker(pool: sqlx::SqlitePool) {
        let manager = ChapelSessionManager::new(&pool);
        let sessions = manager.list().await.unwrap();
        let details = manager.with_speakers(sessions).await.unwrap();

        let first = details.iter().find(|d| d.session.id == 1).unwrap();
        assert_eq!(first.speaker.as_ref().map(|s| s.id), Some(1));
        let second = details.iter().find(|d| d.session.id == 2).unwrap();
        assert!(second.speaker.is_none());
    }

    #[sqlx::test(fixtures("users", "speakers", "chapel_sessions", "feedback"))]
    async fn session_with_feedback_cannot_be_deleted(pool: sqlx::SqlitePool) {
        let manager = ChapelSessionManager::new(&pool);

        assert!(matches!(
            manager.delete(1).await.unwrap_err(),
            Error::Conflict(_)
        ));
        manager.delete(2).await.unwrap();
    }
}
