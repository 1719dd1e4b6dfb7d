use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Failures of the user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("user {0} not found")]
    NotFound(i64),

    #[error("email already registered: {0}")]
    Conflict(String),

    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
}

impl UserError {
    pub fn kind(&self) -> &'static str {
        match self {
            UserError::Validation(_) => "validation",
            UserError::NotFound(_) => "not_found",
            UserError::Conflict(_) => "conflict",
            UserError::Store(_) => "store",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UserError::Validation(_) => StatusCode::BAD_REQUEST,
            UserError::NotFound(_) => StatusCode::NOT_FOUND,
            UserError::Conflict(_) => StatusCode::CONFLICT,
            UserError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for UserError {
    fn from(rejection: JsonRejection) -> Self {
        UserError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for UserError {
    fn from(rejection: PathRejection) -> Self {
        UserError::Validation(rejection.body_text())
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            UserError::Store(e) => {
                error!(error = %e, "user store failure");
                // driver details stay in the logs
                "internal storage error".to_string()
            }
            other => {
                warn!(kind = other.kind(), error = %other, "request rejected");
                other.to_string()
            }
        };
        (
            status,
            Json(json!({ "error": self.kind(), "message": message })),
        )
            .into_response()
    }
}
