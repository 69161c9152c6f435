//! API errors and their JSON responses.

use crate::error::{ErrorKind, InvoiceError};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Failure of one HTTP request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request itself is unusable.
    #[error("{0}")]
    BadRequest(String),

    /// The multipart body could not be read.
    #[error("invalid upload: {0}")]
    Upload(#[from] MultipartError),

    /// Processing or export failed.
    #[error(transparent)]
    Invoice(#[from] InvoiceError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload(e) => e.status(),
            ApiError::Invoice(e) => match e.kind() {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::Render
                | ErrorKind::Extraction
                | ErrorKind::SheetService
                | ErrorKind::Config
                | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        } else {
            tracing::debug!(error = %message, "request rejected");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
