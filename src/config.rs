//! Configuration types for document processing, spreadsheet export and the
//! HTTP server.
//!
//! Processing behaviour is controlled through [`ProcessingConfig`], built via
//! its [`ProcessingConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share across request handlers and to log at start-up.
//!
//! [`SheetsConfig`] and [`ServerConfig`] are plain structs: the binary fills
//! them from CLI flags and environment variables.

use crate::error::InvoiceError;
use crate::progress::ProgressCallback;
use crate::queries::FieldQuerySet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Synchronous analysis requests are limited to 10 MiB of document bytes.
pub const DEFAULT_MAX_PAGE_BYTES: usize = 10 * 1024 * 1024;

/// Default Google OAuth scopes for the spreadsheet service account.
pub const DEFAULT_SHEETS_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/spreadsheets",
];

/// Configuration for turning one uploaded document into a [`crate::DocumentResult`].
///
/// # Example
/// ```rust
/// use invoice2sheets::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .dpi(200)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Rendering DPI for PDF pages. Range: 72–600. Default: 300.
    ///
    /// The analysis service reads small print on invoices (CNPJ, series
    /// numbers) reliably at 300 DPI. Lower values shrink the PNG but start
    /// dropping digits.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 6000.
    ///
    /// A cap independent of DPI so an oversized page cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// Largest page image, in bytes, sent to the analysis service. Default: 10 MiB.
    pub max_page_bytes: usize,

    /// Number of pages analysed at once. Default: 4. `1` is strictly sequential.
    pub concurrency: usize,

    /// Per-analysis-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// How query-nodes are paired with result-nodes. Default: positional.
    pub pairing: PairingStrategy,

    /// Questions asked of every page. Default: the built-in invoice set.
    pub queries: FieldQuerySet,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 6000,
            max_page_bytes: DEFAULT_MAX_PAGE_BYTES,
            concurrency: 4,
            api_timeout_secs: 60,
            pairing: PairingStrategy::default(),
            queries: FieldQuerySet::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_page_bytes", &self.max_page_bytes)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pairing", &self.pairing)
            .field("queries", &self.queries.len())
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_page_bytes(mut self, bytes: usize) -> Self {
        self.config.max_page_bytes = bytes;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn pairing(mut self, strategy: PairingStrategy) -> Self {
        self.config.pairing = strategy;
        self
    }

    pub fn queries(mut self, queries: FieldQuerySet) -> Self {
        self.config.queries = queries;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, InvoiceError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(InvoiceError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(InvoiceError::InvalidConfig(
                "API timeout must be at least 1 second".into(),
            ));
        }
        if c.max_page_bytes == 0 {
            return Err(InvoiceError::InvalidConfig(
                "Maximum page size must be positive".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the extractor pairs query-nodes with result-nodes in a response.
///
/// | Strategy | Pairing rule |
/// |----------|--------------|
/// | `Positional` | i-th query block ↔ i-th result block; counts must match (default) |
/// | `Relationship` | follow each query block's `ANSWER` ids; no answer → `""` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingStrategy {
    #[default]
    Positional,
    Relationship,
}

// ── Spreadsheet & server ─────────────────────────────────────────────────

/// Where and how extracted rows are appended.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Target spreadsheet ID (the long token in the sheet URL).
    pub spreadsheet_id: String,
    /// A1 range the rows are appended after. Default: `Sheet1!A1`.
    pub range: String,
    /// Service-account JSON key file.
    pub credentials_path: PathBuf,
    /// OAuth scopes requested for the service account.
    pub scopes: Vec<String>,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: "Sheet1!A1".to_string(),
            credentials_path: credentials_path.into(),
            scopes: DEFAULT_SHEETS_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address. Default: `127.0.0.1:8000`.
    pub bind: SocketAddr,
    /// Largest accepted upload body in bytes. Default: 25 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ProcessingConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.pairing, PairingStrategy::Positional);
        assert_eq!(c.queries.len(), 6);
    }

    #[test]
    fn builder_clamps() {
        let c = ProcessingConfig::builder()
            .dpi(10_000)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 600);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ProcessingConfig::builder()
            .api_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn sheets_defaults() {
        let s = SheetsConfig::new("abc", "/tmp/key.json");
        assert_eq!(s.range, "Sheet1!A1");
        assert_eq!(s.scopes.len(), 2);
        assert_eq!(s.with_range("Invoices!A1").range, "Invoices!A1");
    }

    #[test]
    fn pairing_parses_lowercase() {
        let p: PairingStrategy = serde_json::from_str("\"relationship\"").unwrap();
        assert_eq!(p, PairingStrategy::Relationship);
    }
}
