//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through a document. The CLI uses it to
//! drive a terminal progress bar; the HTTP server leaves it unset.
//!
//! # Example
//!
//! ```rust
//! use invoice2sheets::{ExtractionProgressCallback, ProcessingConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, field_count: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{}: {} fields", page_num, total_pages, field_count);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// All methods default to no-ops. With `concurrency > 1` the page methods may
/// be called concurrently and out of page order, so implementations must
/// synchronise any shared state.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the page count is known, before any analysis call.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the analysis request for a page (1-indexed) is sent.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's fields were extracted.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, field_count: usize) {
        let _ = (page_num, total_pages, field_count);
    }

    /// Called when a page fails. The document as a whole fails with it.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once when every page succeeded.
    fn on_document_complete(&self, total_pages: usize) {
        let _ = total_pages;
    }
}

/// Shared handle stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// A callback that ignores every event.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        pages: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for Counter {
        fn on_page_complete(&self, _page_num: usize, _total: usize, _fields: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn default_methods_are_noops() {
        let cb = NoopProgressCallback;
        cb.on_document_start(3);
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 6);
        cb.on_page_error(2, 3, "boom");
        cb.on_document_complete(3);
    }

    #[test]
    fn usable_as_trait_object() {
        let counter = Arc::new(Counter {
            pages: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        });
        let cb: ProgressCallback = counter.clone();
        cb.on_page_complete(1, 2, 6);
        cb.on_page_error(2, 2, "timeout");
        assert_eq!(counter.pages.load(Ordering::SeqCst), 1);
        assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    }
}
