//! Error types for the invoice2sheets library.
//!
//! Two layers of error reflect two distinct failure sources:
//!
//! * [`ServiceError`]: a single call to an external collaborator (the
//!   analysis service, the spreadsheet service, or the token endpoint) failed.
//!   It describes *what went wrong on the wire* and nothing more.
//!
//! * [`InvoiceError`]: **fatal** for the request: rendering, extraction or the
//!   sheet append cannot complete. Returned from every public entry point.
//!   Extraction and sheet failures wrap the underlying [`ServiceError`] as
//!   their `source`.
//!
//! Failure is all-or-nothing per document and per append call, so there is no
//! per-page error that survives into a result. [`InvoiceError::kind`] groups
//! the variants into the four caller-facing categories used by the HTTP layer.

use thiserror::Error;

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The document could not be decoded or rasterised.
    Render,
    /// The external analysis call failed or returned an unusable response.
    Extraction,
    /// The caller's payload was missing or empty.
    InvalidInput,
    /// The external spreadsheet call failed.
    SheetService,
    /// The process was started with an invalid configuration.
    Config,
    /// Unexpected internal failure (task panic and the like).
    Internal,
}

/// All fatal errors returned by the invoice2sheets library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Render errors ─────────────────────────────────────────────────────
    /// The PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Document is corrupt or not a valid PDF: {detail}")]
    CorruptDocument { detail: String },

    /// The PDF is encrypted and cannot be opened without a password.
    #[error("Document is encrypted and requires a password")]
    PasswordProtected,

    /// The PDF opened but contains no pages.
    #[error("Document contains no pages")]
    EmptyDocument,

    /// pdfium failed to rasterise one page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A rendered page could not be encoded as PNG.
    #[error("Failed to encode page {page} as PNG: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// A page image exceeds the analysis service's request size limit.
    #[error("Page {page} is {size} bytes, above the {limit}-byte limit")]
    PageTooLarge { page: usize, size: usize, limit: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium on the library path."
    )]
    PdfiumBindingFailed(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The analysis call for a page failed.
    #[error("Analysis failed for page {page}: {source}")]
    AnalysisFailed {
        page: usize,
        #[source]
        source: ServiceError,
    },

    /// The analysis call for a page did not answer within the timeout.
    #[error("Analysis timed out after {secs}s on page {page}")]
    AnalysisTimeout { page: usize, secs: u64 },

    /// Query-nodes and result-nodes cannot be paired positionally.
    #[error(
        "Page {page}: response has {queries} query blocks but {results} result blocks"
    )]
    MisalignedResponse {
        page: usize,
        queries: usize,
        results: usize,
    },

    /// The response is structurally unusable (unknown or duplicate alias, …).
    #[error("Page {page}: malformed analysis response: {detail}")]
    MalformedResponse { page: usize, detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The caller's payload was missing, empty, or unparsable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Sheet errors ──────────────────────────────────────────────────────
    /// The spreadsheet append call failed.
    #[error("Spreadsheet append failed: {source}")]
    SheetAppendFailed {
        #[source]
        source: ServiceError,
    },

    /// No spreadsheet target is configured for this process.
    #[error("Spreadsheet export is not configured")]
    SheetsNotConfigured,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or query-set validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InvoiceError {
    /// Category of this error, used for HTTP status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvoiceError::CorruptDocument { .. }
            | InvoiceError::PasswordProtected
            | InvoiceError::EmptyDocument
            | InvoiceError::RasterisationFailed { .. }
            | InvoiceError::EncodeFailed { .. }
            | InvoiceError::PageTooLarge { .. }
            | InvoiceError::PdfiumBindingFailed(_) => ErrorKind::Render,
            InvoiceError::AnalysisFailed { .. }
            | InvoiceError::AnalysisTimeout { .. }
            | InvoiceError::MisalignedResponse { .. }
            | InvoiceError::MalformedResponse { .. } => ErrorKind::Extraction,
            InvoiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            InvoiceError::SheetAppendFailed { .. } | InvoiceError::SheetsNotConfigured => {
                ErrorKind::SheetService
            }
            InvoiceError::InvalidConfig(_) => ErrorKind::Config,
            InvoiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A failed call to an external collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection, TLS, or other transport failure.
    #[error("{service} request failed: {detail}")]
    Transport { service: &'static str, detail: String },

    /// The HTTP client gave up waiting for a response.
    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The response body could not be decoded.
    #[error("{service} returned an undecodable response: {detail}")]
    Decode { service: &'static str, detail: String },

    /// Credentials are missing, unreadable, or rejected before the call.
    #[error("{service} credentials error: {detail}")]
    Credentials { service: &'static str, detail: String },
}

impl ServiceError {
    /// Classify a `reqwest` failure for the named service.
    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout { service }
        } else if err.is_decode() {
            ServiceError::Decode {
                service,
                detail: err.to_string(),
            }
        } else {
            ServiceError::Transport {
                service,
                detail: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misaligned_display() {
        let e = InvoiceError::MisalignedResponse {
            page: 2,
            queries: 6,
            results: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 2"), "got: {msg}");
        assert!(msg.contains("6 query blocks"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Extraction);
    }

    #[test]
    fn analysis_failed_wraps_source() {
        let e = InvoiceError::AnalysisFailed {
            page: 1,
            source: ServiceError::Status {
                service: "textract",
                status: 400,
                message: "InvalidParameterException".into(),
            },
        };
        assert!(e.to_string().contains("HTTP 400"));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn kinds_cover_taxonomy() {
        assert_eq!(InvoiceError::EmptyDocument.kind(), ErrorKind::Render);
        assert_eq!(
            InvoiceError::InvalidInput("empty".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            InvoiceError::SheetsNotConfigured.kind(),
            ErrorKind::SheetService
        );
        assert_eq!(
            InvoiceError::AnalysisTimeout { page: 1, secs: 60 }.kind(),
            ErrorKind::Extraction
        );
    }

    #[test]
    fn page_too_large_display() {
        let e = InvoiceError::PageTooLarge {
            page: 3,
            size: 11_000_000,
            limit: 10_485_760,
        };
        assert!(e.to_string().contains("Page 3"));
        assert!(e.to_string().contains("10485760"));
    }
}
