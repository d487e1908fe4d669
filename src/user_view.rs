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
    user_manager::{NewUser, UserManager, UserPatch},
    User,
};
use crate::validate;
use crate::AppState;

#[derive(Deserialize, Debug, Default)]
pub struct UserPayload {
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    user_type: Option<String>,
}

impl TryFrom<UserPayload> for NewUser {
    type Error = Error;

    fn try_from(payload: UserPayload) -> Result<Self> {
        let user_type = validate::required_text(payload.user_type, "user_type")?;
        Ok(NewUser {
            email: validate::required_text(payload.email, "email")?,
            first_name: validate::required_text(payload.first_name, "first_name")?,
            last_name: validate::required_text(payload.last_name, "last_name")?,
            user_type: validate::parse_user_type(&user_type, "user_type")?,
        })
    }
}

impl TryFrom<UserPayload> for UserPatch {
    type Error = Error;

    fn try_from(payload: UserPayload) -> Result<Self> {
        Ok(UserPatch {
            email: payload
                .email
                .map(|email| validate::non_blank(email, "email"))
                .transpose()?,
            first_name: payload
                .first_name
                .map(|name| validate::non_blank(name, "first_name"))
                .transpose()?,
            last_name: payload
                .last_name
                .map(|name| validate::non_blank(name, "last_name"))
                .transpose()?,
            user_type: payload
                .user_type
                .map(|kind| validate::parse_user_type(&kind, "user_type"))
                .transpose()?,
        })
    }
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>> {
    Ok(Json(UserManager::new(&state.pool).list().await?))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
) -> Result<Json<User>> {
    Ok(Json(UserManager::new(&state.pool).get(id).await?))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<UserPayload>, Error>,
) -> Result<(StatusCode, Json<User>)> {
    let user = NewUser::try_from(payload)?;
    let created = UserManager::new(&state.pool).create(&user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /api/users`: create or update keyed by email.
pub async fn upsert_user(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<UserPayload>, Error>,
) -> Result<(StatusCode, Json<User>)> {
    let user = NewUser::try_from(payload)?;
    let (row, created) = UserManager::new(&state.pool).upsert(&user).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(row)))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
    WithRejection(Json(payload), _): WithRejection<Json<UserPayload>, Error>,
) -> Result<Json<User>> {
    let patch = UserPatch::try_from(payload)?;
    Ok(Json(UserManager::new(&state.pool).update(id, patch).await?))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, Error>,
) -> Result<StatusCode> {
    UserManager::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::UserType;

    fn payload(json: &str) -> UserPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn create_requires_every_field() {
        let err = NewUser::try_from(payload(
            r#"{"email": "a@b.com", "first_name": "A", "user_type": "STUDENT"}"#,
        ))
        .unwrap_err();

        assert_eq!(err.to_string(), "last_name is required");
    }

    #[test]
    fn create_rejects_unknown_user_type() {
        let result = NewUser::try_from(payload(
            r#"{"email": "a@b.com", "first_name": "A", "last_name": "B", "user_type": "PASTOR"}"#,
        ));

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn patch_ignores_unknown_keys() {
        let patch = UserPatch::try_from(payload(r#"{"nickname": "Al"}"#)).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_validates_user_type() {
        let patch = UserPatch::try_from(payload(r#"{"user_type": "ALUMNI"}"#)).unwrap();
        assert_eq!(patch.user_type, Some(UserType::Alumni));
        assert!(UserPatch::try_from(payload(r#"{"user_type": "alum"}"#)).is_err());
    }
}
