use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::error::ErrorKind;
use thiserror::Error;
use tracing::{debug, error};

/// Every failure a resource handler can surface, mapped onto one HTTP status each.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input, including references to rows that don't exist.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Unique or referential-integrity violation. Reported as 400 like a validation failure.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Internal(sqlx::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn not_found(entity: &str, id: i64) -> Self {
        Error::NotFound(format!("{entity} {id} not found"))
    }

    pub fn missing_reference(entity: &str, id: i64) -> Self {
        Error::Validation(format!("{entity} {id} does not exist"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::Conflict(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return Error::NotFound("record not found".to_owned());
        }

        let violation = err
            .as_database_error()
            .map(|db| (db.kind(), db.message().to_owned()));

        match violation {
            Some((ErrorKind::UniqueViolation, message)) => Error::Conflict(message),
            Some((ErrorKind::ForeignKeyViolation, _)) => {
                Error::Conflict("operation violates a foreign key constraint".to_owned())
            }
            Some((ErrorKind::CheckViolation, message)) | Some((ErrorKind::NotNullViolation, message)) => {
                Error::Validation(message)
            }
            _ => Error::Internal(err),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Error::Internal(err) => {
                error!("unhandled database error: {err}");
                "internal server error".to_owned()
            }
            other => {
                debug!("request failed with {status}: {other}");
                other.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
