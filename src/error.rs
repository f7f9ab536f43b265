use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    SelfReference(String),
    DuplicateRequest(String),
    InvalidTransition(String),
    Unauthorized(String),
    NotFound(String),
    NotAParticipant(String),
    EmptyParticipants(String),
    Validation(String),
    // Store failures
    StoreUnavailable(String),
    Internal(String),
}

impl AppError {
    /// Only connectivity problems are worth retrying; every other kind is
    /// permanent for the same inputs.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_))
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::SelfReference(_) => "self_reference",
            AppError::DuplicateRequest(_) => "duplicate_request",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::NotAParticipant(_) => "not_a_participant",
            AppError::EmptyParticipants(_) => "empty_participants",
            AppError::Validation(_) => "validation",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::SelfReference(msg) => write!(f, "Self reference: {}", msg),
            AppError::DuplicateRequest(msg) => write!(f, "Duplicate request: {}", msg),
            AppError::InvalidTransition(msg) => write!(f, "Invalid transition: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::NotAParticipant(msg) => write!(f, "Not a participant: {}", msg),
            AppError::EmptyParticipants(msg) => write!(f, "Empty participants: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::SelfReference(msg)
            | AppError::DuplicateRequest(msg)
            | AppError::InvalidTransition(msg)
            | AppError::EmptyParticipants(msg)
            | AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) | AppError::NotAParticipant(msg) => {
                (StatusCode::FORBIDDEN, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "kind": self.kind(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Database(db_err) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
                let busy = db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| matches!(code & 0xff, 5 | 6))
                    .unwrap_or(false);
                if busy {
                    AppError::StoreUnavailable(err.to_string())
                } else {
                    AppError::Internal(err.to_string())
                }
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
