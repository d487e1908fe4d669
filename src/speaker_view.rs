use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::manager::{
    speaker_manager::{NewSpeaker, SpeakerManager, SpeakerPatch},
    Speaker,
};
use crate::utils::double_option;
use crate::validate;
use crate::AppState;

#[derive(Deserialize, Debug, Default)]
pub struct SpeakerPayload {
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    bio: Option<Option<String>>,
    title: Option<String>,
    #[serde(rename = "type")]
    speaker_type: Option<String>,
}

impl TryFrom<SpeakerPayload> for NewSpeaker {
    type Error = Error;

    fn try_from(payload: SpeakerPayload) -> Result<Self> {
        let speaker_type = validate::required_text(payload.speaker_type, "type")?;
        Ok(NewSpeaker {
            first_name: validate::required_text(payload.first_name, "first_name")?,
            last_name: validate::required_text(payload.last_name, "last_name")?,
            bio: validate::required_text(payload.bio.flatten(), "bio")?,
            title: validate::required_text(payload.title, "title")?,
            speaker_type: validate::parse_user_type(&speaker_type, "type")?,
        })
    }
}

impl TryFrom<SpeakerPayload> for SpeakerPatch {
    type Error = Error;

    fn try_from(payload: SpeakerPayload) -> Result<Self> {
        Ok(SpeakerPatch {
            first_name: payload
                .first_name
                .map(|name| validate::non_blank(name, "first_name"))
                .transpose()?,
            last_name: payload
                .last_name
                .map(|name| validate::non_blank(name, "last_name"))
                .transpose()?,
            bio: payload.bio,
            title: payload
                .title
                .map(|title| validate::non_blank(title, "title"))
                .transpose()?,
            speaker_type: payload
                .speaker_type
                .map(|kind| validate::parse_user_type(&kind, "type"))
                .transpose()?,
        })
    }
}

pub async fn list_speakers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Speaker>>> {
    Ok(Json(SpeakerManager::new(&state.pool).list().await?))
}

pub async fn get_speaker(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
) -> Result<Json<Speaker>> {
    Ok(Json(SpeakerManager::new(&state.pool).get(id).await?))
}

pub async fn create_speaker(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<SpeakerPayload>, Error>,
) -> Result<(StatusCode, Json<Speaker>)> {
    let speaker = NewSpeaker::try_from(payload)?;
    let created = SpeakerManager::new(&state.pool).create(&speaker).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_speaker(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
    WithRejection(Json(payload), _): WithRejection<Json<SpeakerPayload>, Error>,
) -> Result<Json<Speaker>> {
    let patch = SpeakerPatch::try_from(payload)?;
    Ok(Json(SpeakerManager::new(&state.pool).update(id, patch).await?))
}

pub async fn delete_speaker(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
) -> Result<StatusCode> {
    SpeakerManager::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
