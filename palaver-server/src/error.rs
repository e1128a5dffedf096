use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use palaver_core::{AiError, StoreError};
use serde::Serialize;
use thiserror::Error;

/// Shown to the browser for every upstream failure; the real cause stays in the log.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to get AI response. Please try again.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("AI service failure: {0}")]
    Upstream(#[from] AiError),

    #[error("Session store failure: {0}")]
    Session(#[from] StoreError),

    #[error("Template error: {0}")]
    Render(#[from] minijinja::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) | AppError::Session(_) | AppError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text safe to send to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotAuthenticated | AppError::Validation(_) => self.to_string(),
            AppError::Upstream(_) => UPSTREAM_FAILURE_MESSAGE.to_string(),
            AppError::Session(_) | AppError::Render(_) => "Internal server error".to_string(),
        }
    }
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(ErrorResponse::new(self.public_message()))).into_response()
    }
}
