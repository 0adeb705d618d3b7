use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::errors::TimeboxError;

/// Error type for HTTP handlers.
///
/// Wraps [`TimeboxError`] for domain errors and adds request-level variants.
/// Every error renders as `{ "success": false, "error": "<message>" }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] TimeboxError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(core) => match core {
                TimeboxError::Validation(_)
                | TimeboxError::Conflict(_)
                | TimeboxError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
                TimeboxError::NotFound(_)
                | TimeboxError::NoRunningScript(_)
                | TimeboxError::ScriptFileMissing(_) => StatusCode::NOT_FOUND,
                TimeboxError::Launch(_)
                | TimeboxError::Config(_)
                | TimeboxError::Io(_)
                | TimeboxError::Toml(_)
                | TimeboxError::Json(_)
                | TimeboxError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Core(TimeboxError::NotFound(_)) => "Script not found".to_string(),
            ApiError::Core(TimeboxError::ScriptFileMissing(_)) => {
                "Script file not found".to_string()
            }
            ApiError::Core(TimeboxError::NoRunningScript(_)) => {
                "No running script found with this ID".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = json!({
            "success": false,
            "error": self.message(),
        });

        (status, axum::Json(body)).into_response()
    }
}
