//! Append extracted rows to the configured spreadsheet.

use crate::config::SheetsConfig;
use crate::error::InvoiceError;
use crate::output::FieldMap;
use crate::services::SheetService;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// What the spreadsheet service confirmed after an append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendOutcome {
    /// `updates.updatedCells`; 0 when the service omits it.
    pub updated_cells: u64,
    pub updated_rows: u64,
    pub updated_range: Option<String>,
}

/// Writes field maps as rows after a fixed sheet range.
#[derive(Clone)]
pub struct SheetAppender {
    service: Arc<dyn SheetService>,
    spreadsheet_id: String,
    range: String,
}

impl SheetAppender {
    pub fn new(
        service: Arc<dyn SheetService>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            service,
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
        }
    }

    pub fn from_config(service: Arc<dyn SheetService>, config: &SheetsConfig) -> Self {
        Self::new(service, config.spreadsheet_id.clone(), config.range.clone())
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn range(&self) -> &str {
        &self.range
    }

    /// Append one row per map, values in the map's own key order.
    ///
    /// # Errors
    /// [`InvoiceError::InvalidInput`] for an empty `rows` (no call is made);
    /// [`InvoiceError::SheetAppendFailed`] when the service call fails.
    pub async fn append(&self, rows: &[FieldMap]) -> Result<AppendOutcome, InvoiceError> {
        if rows.is_empty() {
            return Err(InvoiceError::InvalidInput("no rows to append".into()));
        }

        let values: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.values().cloned().collect())
            .collect();

        let response = self
            .service
            .append_values(&self.spreadsheet_id, &self.range, values)
            .await
            .map_err(|source| InvoiceError::SheetAppendFailed { source })?;

        info!(
            "Appended {} row(s) to {} via {}: {} cells updated",
            rows.len(),
            response.updated_range.as_deref().unwrap_or(&self.range),
            self.service.name(),
            response.updated_cells
        );

        Ok(AppendOutcome {
            updated_cells: response.updated_cells,
            updated_rows: response.updated_rows,
            updated_range: response.updated_range,
        })
    }
}
