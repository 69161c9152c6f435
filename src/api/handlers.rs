//! Route handlers.

use crate::api::error::ApiError;
use crate::api::router::AppState;
use crate::error::InvoiceError;
use crate::output::{DocumentResult, FieldMap};
use crate::pipeline::input::Document;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

/// Multipart field carrying the uploaded document.
pub const UPLOAD_FIELD: &str = "file";

const INVALID_ROWS: &str = "Missing or invalid data";

/// `POST /detect-text`: extract the configured fields from every page.
pub async fn detect_text(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DocumentResult>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some((bytes, content_type, name));
        break;
    }

    let (bytes, content_type, name) = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("missing multipart field '{}'", UPLOAD_FIELD))
    })?;
    let document = Document::new(bytes.to_vec(), content_type.as_deref(), name)?;

    let result = state.processor.process(document).await?;
    info!("detect-text: {} page(s) extracted", result.len());
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub status: &'static str,
    pub updated_cells: u64,
}

/// `POST /save-in-sheets`: append one row per field map.
///
/// The body is parsed by hand so that every malformed payload gets the same
/// 400 answer.
pub async fn save_in_sheets(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SaveResponse>, ApiError> {
    let rows: Vec<FieldMap> = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest(INVALID_ROWS.to_string()))?;
    if rows.is_empty() {
        return Err(ApiError::BadRequest(INVALID_ROWS.to_string()));
    }

    let appender = state
        .appender
        .as_ref()
        .ok_or(InvoiceError::SheetsNotConfigured)?;
    let outcome = appender.append(&rows).await?;

    Ok(Json(SaveResponse {
        status: "success",
        updated_cells: outcome.updated_cells,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
