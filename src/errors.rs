use crate::{models::property::PropertyValueError, storage::StorageError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Everything that can stop a pipeline run.
///
/// Per-blob processor and extractor failures are not in here: those are
/// recorded and reported, and the run carries on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("unknown metadata processor `{0}`")]
    UnknownProcessor(String),
    #[error("unknown property extractor `{0}`")]
    UnknownExtractor(String),
    #[error("content hash mismatch for `{key}`: listing reported `{listed}`, stat reported `{stat}`")]
    Integrity {
        key: String,
        listed: String,
        stat: String,
    },
    #[error("a run is already in progress for schema `{0}`")]
    Busy(String),
    #[error("run cancelled")]
    Cancelled,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Property(#[from] PropertyValueError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Errors raised before any I/O because the request itself is wrong.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidScope(_) | Self::UnknownProcessor(_) | Self::UnknownExtractor(_)
        )
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            e if e.is_configuration() => StatusCode::BAD_REQUEST,
            PipelineError::BucketNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Busy(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_pipeline_errors_to_statuses() {
        let cases = [
            (PipelineError::InvalidScope("schema".into()), StatusCode::BAD_REQUEST),
            (PipelineError::UnknownProcessor("ocr".into()), StatusCode::BAD_REQUEST),
            (PipelineError::BucketNotFound("photos".into()), StatusCode::NOT_FOUND),
            (PipelineError::Busy("catalog".into()), StatusCode::CONFLICT),
            (PipelineError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}
