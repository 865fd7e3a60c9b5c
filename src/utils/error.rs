//! Error types and handling
//!
//! Common error types used across the application.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::library::LibraryError;
use crate::stream::StreamError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

impl AppError {
    /// HTTP status the error maps to when it reaches a handler
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Library(LibraryError::NotFound(_))
            | AppError::Library(LibraryError::InvalidName(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body for HTTP clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        let code = match error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Stream(_) => "STREAM_ERROR",
            AppError::Library(LibraryError::NotFound(_))
            | AppError::Library(LibraryError::InvalidName(_)) => "NOT_FOUND",
            AppError::Library(_) => "LIBRARY_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
