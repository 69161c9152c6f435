//! # invoice2sheets
//!
//! Extract named fields from invoice images and PDFs with query-based OCR,
//! and append them to a spreadsheet.
//!
//! ## Why queries?
//!
//! Invoices put the same facts (tax id, total, issue date) in a different
//! place on every layout. Instead of parsing raw OCR text, each page is sent
//! to a document-analysis service together with a fixed list of questions
//! ("What is the invoice number?"), and the service answers each one. The
//! answers become one field map per page, keyed by the question's alias.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (PDF / PNG / JPEG / TIFF)
//!  │
//!  ├─ 1. Input    resolve media type (declared or sniffed)
//!  ├─ 2. Render   PDF → one PNG per page via pdfium (spawn_blocking)
//!  ├─ 3. Extract  one AnalyzeDocument QUERIES call per page, bounded fan-out
//!  ├─ 4. Output   field maps assembled in page order
//!  └─ 5. Sheets   optional: one row per map, values.append
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice2sheets::{Document, DocumentProcessor, ProcessingConfig, TextractClient};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Region and credentials from the default AWS chain
//!     let textract = TextractClient::from_env(Duration::from_secs(60)).await?;
//!     let config = ProcessingConfig::default();
//!     let processor = DocumentProcessor::new(Arc::new(textract), &config);
//!
//!     let bytes = std::fs::read("invoice.pdf")?;
//!     let document = Document::new(bytes, Some("application/pdf"), None)?;
//!     let result = processor.process(document).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice2sheets` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding the library or the router in another service:
//! ```toml
//! invoice2sheets = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod queries;
pub mod services;
pub mod sheets;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    PairingStrategy, ProcessingConfig, ProcessingConfigBuilder, ServerConfig, SheetsConfig,
};
pub use error::{ErrorKind, InvoiceError, ServiceError};
pub use output::{DocumentResult, ExtractionResult, FieldMap};
pub use pipeline::input::{Document, MediaType, Page};
pub use process::DocumentProcessor;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use queries::{FieldQuery, FieldQuerySet, QueryError};
pub use services::{
    AnalysisService, GoogleSheetsClient, ServiceAccountTokenProvider, SheetService,
    TextractClient,
};
pub use sheets::{AppendOutcome, SheetAppender};
