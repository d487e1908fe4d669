use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::manager::{
    chapel_manager::{ChapelSessionManager, ChapelSessionPatch, NewChapelSession},
    ChapelSession, ChapelSessionDetail,
};
use crate::utils::{double_option, IncludeQuery};
use crate::validate;
use crate::AppState;

#[derive(Deserialize, Debug, Default)]
pub struct ChapelSessionPayload {
    #[serde(alias = "title")]
    topic: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    scripture: Option<Option<String>>,
    date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    end_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    number_standings: Option<Option<i64>>,
    #[serde(default, alias = "speakerId", deserialize_with = "double_option")]
    speaker_id: Option<Option<i64>>,
}

fn standings(value: Option<i64>) -> Result<Option<i64>> {
    value
        .map(|count| validate::non_negative(count, "number_standings"))
        .transpose()
}

impl TryFrom<ChapelSessionPayload> for NewChapelSession {
    type Error = Error;

    fn try_from(payload: ChapelSessionPayload) -> Result<Self> {
        let session = NewChapelSession {
            topic: validate::required_text(payload.topic, "topic")?,
            scripture: payload.scripture.flatten(),
            date: validate::required(payload.date, "date")?,
            end_time: payload.end_time.flatten(),
            number_standings: standings(payload.number_standings.flatten())?,
            speaker_id: payload.speaker_id.flatten(),
        };
        validate::time_order(session.date, session.end_time)?;
        Ok(session)
    }
}

impl TryFrom<ChapelSessionPayload> for ChapelSessionPatch {
    type Error = Error;

    fn try_from(payload: ChapelSessionPayload) -> Result<Self> {
        Ok(ChapelSessionPatch {
            topic: payload
                .topic
                .map(|topic| validate::non_blank(topic, "topic"))
                .transpose()?,
            scripture: payload.scripture,
            date: payload.date,
            end_time: payload.end_time,
            number_standings: payload.number_standings.map(standings).transpose()?,
            speaker_id: payload.speaker_id,
        })
    }
}

async fn detail(
    manager: &ChapelSessionManager<'_>,
    sessions: Vec<ChapelSession>,
    include: &IncludeQuery,
) -> Result<Vec<ChapelSessionDetail>> {
    if include.wants("speaker") {
        manager.with_speakers(sessions).await
    } else {
        Ok(sessions.into_iter().map(ChapelSessionDetail::from).collect())
    }
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(include), _): WithRejection<Query<IncludeQuery>, Error>,
) -> Result<Json<Vec<ChapelSessionDetail>>> {
    let manager = ChapelSessionManager::new(&state.pool);
    let sessions = manager.list().await?;
    Ok(Json(detail(&manager, sessions, &include).await?))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
    WithRejection(Query(include), _): WithRejection<Query<IncludeQuery>, Error>,
) -> Result<Json<ChapelSessionDetail>> {
    let manager = ChapelSessionManager::new(&state.pool);
    let session = manager.get(id).await?;
    let mut details = detail(&manager, vec![session], &include).await?;
    details
        .pop()
        .map(Json)
        .ok_or_else(|| Error::not_found("chapel session", id))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<ChapelSessionPayload>, Error>,
) -> Result<(StatusCode, Json<ChapelSession>)> {
    let session = NewChapelSession::try_from(payload)?;
    let created = ChapelSessionManager::new(&state.pool)
        .create(&session)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
    WithRejection(Json(payload), _): WithRejection<Json<ChapelSessionPayload>, Error>,
) -> Result<Json<ChapelSession>> {
    let patch = ChapelSessionPatch::try_from(payload)?;
    Ok(Json(
        ChapelSessionManager::new(&state.pool)
            .update(id, patch)
            .await?,
    ))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
) -> Result<StatusCode> {
    ChapelSessionManager::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> ChapelSessionPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn title_is_accepted_for_topic() {
        let session = NewChapelSession::try_from(payload(
            r#"{"title": "Hope", "date": "2024-03-04T10:00:00Z"}"#,
        ))
        .unwrap();

        assert_eq!(session.topic, "Hope");
        assert_eq!(session.end_time, None);
    }

    #[test]
    fn date_is_required() {
        let err = NewChapelSession::try_from(payload(r#"{"topic": "Hope"}"#)).unwrap_err();
        assert_eq!(err.to_string(), "date is required");
    }

    #[test]
    fn negative_standings_are_rejected() {
        assert!(NewChapelSession::try_from(payload(
            r#"{"topic": "Hope", "date": "2024-03-04T10:00:00Z", "number_standings": -2}"#,
        ))
        .is_err());
        assert!(ChapelSessionPatch::try_from(payload(r#"{"number_standings": -2}"#)).is_err());
    }

    #[test]
    fn patch_keeps_null_apart_from_absent() {
        let patch = ChapelSessionPatch::try_from(payload(r#"{"end_time": null}"#)).unwrap();

        assert_eq!(patch.end_time, Some(None));
        assert_eq!(patch.speaker_id, None);
    }
}
