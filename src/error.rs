use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use std::path::PathBuf;

/// Failure of a single request. Every handler returns one of these and the
/// `IntoResponse` impl below is the only place they become HTTP.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Selected folder does not exist: {}", .0.display())]
    InvalidRoot(PathBuf),

    /// Carries the caller's relative input only, never the resolved path.
    #[error("path outside allowed directory: {0}")]
    NotContained(String),

    #[error("{what} not found: {path}")]
    NotFound { what: &'static str, path: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("HTML file not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("Could not find embeddedImageList in HTML file")]
    MarkerNotFound,

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Io { context: context.into(), source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidRoot(_) => StatusCode::BAD_REQUEST,
            AppError::NotContained(_) => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } | AppError::TemplateMissing(_) => StatusCode::NOT_FOUND,
            AppError::Io { .. } | AppError::MarkerNotFound | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {e}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::warn!("{self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
