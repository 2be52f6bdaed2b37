use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::generation::{GenerationError, PromptError};
use crate::persist::PersistError;
use crate::storage::StoreError;

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Error surfaced by HTTP handlers. Every variant renders as the usual
/// `{ success: false, message }` envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// Business-level auth failure. Rendered with 200 so existing clients
    /// keep reading `success` instead of the status line.
    #[error("{0}")]
    Auth(String),

    /// A bearer token was sent but did not verify.
    #[error("invalid bearer token: {0}")]
    Unauthorized(String),

    #[error("image generation failed: {0}")]
    UpstreamGeneration(#[from] GenerationError),

    #[error("prompt generation failed: {0}")]
    PromptGeneration(#[from] PromptError),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid image format: {0}")]
    InvalidImageFormat(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<PersistError> for AppError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::InvalidImageFormat(detail) => AppError::InvalidImageFormat(detail),
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidImageFormat(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::OK,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::UpstreamGeneration(_) | AppError::PromptGeneration(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Persistence(_) | AppError::Store(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        let body = ErrorEnvelope {
            success: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_keep_ok_status() {
        assert_eq!(AppError::Auth("bad".into()).status(), StatusCode::OK);
        assert_eq!(
            AppError::Validation("missing".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("gone".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Unauthorized("token expired".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn invalid_format_persist_error_maps_to_bad_request() {
        let err: AppError = PersistError::InvalidImageFormat("nope".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
