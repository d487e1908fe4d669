use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::manager::{
    feedback_manager::{FeedbackManager, FeedbackPatch, FeedbackRelations, NewFeedback},
    Feedback, FeedbackDetail,
};
use crate::utils::{double_option, IncludeQuery};
use crate::validate;
use crate::AppState;

#[derive(Deserialize, Debug, Default)]
pub struct FeedbackPayload {
    stars: Option<i64>,
    #[serde(default, alias = "content", deserialize_with = "double_option")]
    response: Option<Option<String>>,
    #[serde(alias = "author_id")]
    user_id: Option<i64>,
    chapel_session_id: Option<i64>,
}

impl TryFrom<FeedbackPayload> for NewFeedback {
    type Error = Error;

    fn try_from(payload: FeedbackPayload) -> Result<Self> {
        Ok(NewFeedback {
            chapel_session_id: validate::required(payload.chapel_session_id, "chapel_session_id")?,
            user_id: validate::required(payload.user_id, "user_id")?,
            stars: validate::stars(validate::required(payload.stars, "stars")?)?,
            response: Some(validate::required_text(
                payload.response.flatten(),
                "response",
            )?),
        })
    }
}

impl TryFrom<FeedbackPayload> for FeedbackPatch {
    type Error = Error;

    fn try_from(payload: FeedbackPayload) -> Result<Self> {
        if payload.user_id.is_some() {
            return Err(Error::Validation(
                "the author of a feedback entry cannot be changed".to_owned(),
            ));
        }

        Ok(FeedbackPatch {
            stars: payload.stars.map(validate::stars).transpose()?,
            response: payload.response,
            chapel_session_id: payload.chapel_session_id,
        })
    }
}

impl From<&IncludeQuery> for FeedbackRelations {
    fn from(include: &IncludeQuery) -> Self {
        FeedbackRelations {
            session: include.wants("session"),
            author: include.wants("author"),
        }
    }
}

async fn detail(
    manager: &FeedbackManager<'_>,
    feedback: Vec<Feedback>,
    include: &IncludeQuery,
) -> Result<Vec<FeedbackDetail>> {
    let relations = FeedbackRelations::from(include);
    if relations.any() {
        manager.with_relations(feedback, relations).await
    } else {
        Ok(feedback.into_iter().map(FeedbackDetail::from).collect())
    }
}

async fn single(
    manager: &FeedbackManager<'_>,
    feedback: Feedback,
    include: &IncludeQuery,
) -> Result<Json<FeedbackDetail>> {
    let id = feedback.id;
    detail(manager, vec![feedback], include)
        .await?
        .pop()
        .map(Json)
        .ok_or_else(|| Error::not_found("feedback", id))
}

pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(include), _): WithRejection<Query<IncludeQuery>, Error>,
) -> Result<Json<Vec<FeedbackDetail>>> {
    let manager = FeedbackManager::new(&state.pool);
    let feedback = manager.list().await?;
    Ok(Json(detail(&manager, feedback, &include).await?))
}

pub async fn get_feedback(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
    WithRejection(Query(include), _): WithRejection<Query<IncludeQuery>, Error>,
) -> Result<Json<FeedbackDetail>> {
    let manager = FeedbackManager::new(&state.pool);
    let feedback = manager.get(id).await?;
    single(&manager, feedback, &include).await
}

/// `GET /api/chapel/:chapelId/feedback`
pub async fn list_session_feedback(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(chapel_id), _): WithRejection<Path<i64>, Error>,
    WithRejection(Query(include), _): WithRejection<Query<IncludeQuery>, Error>,
) -> Result<Json<Vec<FeedbackDetail>>> {
    let manager = FeedbackManager::new(&state.pool);
    let feedback = manager.list_for_session(chapel_id).await?;
    Ok(Json(detail(&manager, feedback, &include).await?))
}

/// `GET /api/chapel/:chapelId/feedback/:feedbackId`
pub async fn get_session_feedback(
    State(state): State<Arc<AppState>>,
    WithRejection(Path((chapel_id, feedback_id)), _): WithRejection<Path<(i64, i64)>, Error>,
    WithRejection(Query(include), _): WithRejection<Query<IncludeQuery>, Error>,
) -> Result<Json<FeedbackDetail>> {
    let manager = FeedbackManager::new(&state.pool);
    let feedback = manager.get_for_session(chapel_id, feedback_id).await?;
    single(&manager, feedback, &include).await
}

pub async fn create_feedback(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<FeedbackPayload>, Error>,
) -> Result<(StatusCode, Json<Feedback>)> {
    let feedback = NewFeedback::try_from(payload)?;
    let created = FeedbackManager::new(&state.pool).create(&feedback).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_feedback(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
    WithRejection(Json(payload), _): WithRejection<Json<FeedbackPayload>, Error>,
) -> Result<Json<Feedback>> {
    let patch = FeedbackPatch::try_from(payload)?;
    Ok(Json(FeedbackManager::new(&state.pool).update(id, patch).await?))
}

pub async fn delete_feedback(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
) -> Result<StatusCode> {
    FeedbackManager::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> FeedbackPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn aliases_are_accepted() {
        let feedback = NewFeedback::try_from(payload(
            r#"{"stars": 4, "content": "Good", "author_id": 3, "chapel_session_id": 2}"#,
        ))
        .unwrap();

        assert_eq!(feedback.user_id, 3);
        assert_eq!(feedback.response.as_deref(), Some("Good"));
    }

    #[test]
    fn stars_out_of_range_are_rejected() {
        for stars in [0, 6] {
            let result = NewFeedback::try_from(payload(&format!(
                r#"{{"stars": {stars}, "response": "x", "user_id": 1, "chapel_session_id": 1}}"#
            )));
            assert!(matches!(result, Err(Error::Validation(_))));
        }
        assert!(FeedbackPatch::try_from(payload(r#"{"stars": 7}"#)).is_err());
    }

    #[test]
    fn author_cannot_be_patched() {
        assert!(FeedbackPatch::try_from(payload(r#"{"user_id": 2}"#)).is_err());
    }
}
