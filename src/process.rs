//! Document orchestration: render once, extract every page, assemble in order.
//!
//! ```text
//! Idle ──▶ Rendering ──▶ Extracting[0..N) ──▶ Done
//!              │                │
//!              └──────┬─────────┘
//!                     ▼
//!                   Failed
//! ```
//!
//! Pages are analysed with bounded fan-out (`concurrency`). Each result is
//! written into the slot of its page ordinal, so completion order never
//! shows up in the output. The first page failure fails the whole document:
//! in-flight calls are dropped and nothing already extracted is returned.

use crate::config::ProcessingConfig;
use crate::error::InvoiceError;
use crate::output::{DocumentResult, ExtractionResult};
use crate::pipeline::extract::FieldExtractor;
use crate::pipeline::input::Document;
use crate::pipeline::render::{self, PageRenderer, PdfiumPageRenderer};
use crate::progress::ProgressCallback;
use crate::queries::FieldQuerySet;
use crate::services::AnalysisService;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Turns an uploaded document into one field map per page.
///
/// Built once at start-up and shared across requests; it holds no
/// per-request state.
#[derive(Clone)]
pub struct DocumentProcessor {
    renderer: Arc<dyn PageRenderer>,
    extractor: FieldExtractor,
    concurrency: usize,
    progress_callback: Option<ProgressCallback>,
}

impl DocumentProcessor {
    /// Processor using pdfium for rendering and `service` for analysis.
    pub fn new(service: Arc<dyn AnalysisService>, config: &ProcessingConfig) -> Self {
        Self {
            renderer: Arc::new(PdfiumPageRenderer::from_config(config)),
            extractor: FieldExtractor::from_config(service, config),
            concurrency: config.concurrency.max(1),
            progress_callback: config.progress_callback.clone(),
        }
    }

    /// Replace the page renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn queries(&self) -> &FieldQuerySet {
        self.extractor.queries()
    }

    /// Render `document` and extract every page.
    ///
    /// # Returns
    /// One [`ExtractionResult`] per page, element *i* ↔ page *i*.
    ///
    /// # Errors
    /// The render error, or the first page extraction error. No partial
    /// result is ever returned.
    pub async fn process(&self, document: Document) -> Result<DocumentResult, InvoiceError> {
        let start = Instant::now();
        info!(
            "Processing {} ({}, {} bytes)",
            document.name.as_deref().unwrap_or("<unnamed>"),
            document.media_type,
            document.len()
        );

        // ── Step 1: Render ───────────────────────────────────────────────
        let pages = render::render_document(Arc::clone(&self.renderer), Arc::new(document)).await?;
        let total_pages = pages.len();
        if total_pages == 0 {
            return Err(InvoiceError::EmptyDocument);
        }
        info!("Rendered {} page(s) in {:?}", total_pages, start.elapsed());

        let cb = self.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_document_start(total_pages);
        }

        // ── Step 2: Extract, bounded fan-out ─────────────────────────────
        let extractor = &self.extractor;
        let extracted: Vec<(usize, ExtractionResult)> = stream::iter(pages.into_iter().map(
            |page| async move {
                let page_num = page.number();
                if let Some(cb) = cb {
                    cb.on_page_start(page_num, total_pages);
                }
                match extractor.extract(&page).await {
                    Ok(result) => {
                        if let Some(cb) = cb {
                            cb.on_page_complete(page_num, total_pages, result.len());
                        }
                        Ok((page.index, result))
                    }
                    Err(e) => {
                        warn!("Page {}/{} failed: {}", page_num, total_pages, e);
                        if let Some(cb) = cb {
                            cb.on_page_error(page_num, total_pages, &e.to_string());
                        }
                        Err(e)
                    }
                }
            },
        ))
        .buffer_unordered(self.concurrency)
        .try_collect()
        .await?;

        // ── Step 3: Assemble by page ordinal ─────────────────────────────
        let mut slots: Vec<Option<ExtractionResult>> = (0..total_pages).map(|_| None).collect();
        for (index, result) in extracted {
            let slot = slots.get_mut(index).ok_or_else(|| {
                InvoiceError::Internal(format!(
                    "page index {} outside a {}-page document",
                    index, total_pages
                ))
            })?;
            *slot = Some(result);
        }
        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    InvoiceError::Internal(format!("page {} produced no result", index + 1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(cb) = cb {
            cb.on_document_complete(total_pages);
        }
        info!(
            "Extracted {} page(s) in {:?}",
            total_pages,
            start.elapsed()
        );

        Ok(DocumentResult::new(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ServiceError};
    use crate::pipeline::input::Page;
    use crate::progress::ExtractionProgressCallback;
    use crate::services::{AnalyzeRequest, AnalyzeResponse, Block};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Splits the content on `|`, one page per piece.
    struct SplitRenderer;

    impl PageRenderer for SplitRenderer {
        fn render(&self, document: &Document) -> Result<Vec<Page>, InvoiceError> {
            Ok(document
                .content
                .split(|b| *b == b'|')
                .enumerate()
                .map(|(index, image)| Page {
                    index,
                    image: image.to_vec(),
                })
                .collect())
        }
    }

    struct BrokenRenderer;

    impl PageRenderer for BrokenRenderer {
        fn render(&self, _: &Document) -> Result<Vec<Page>, InvoiceError> {
            Err(InvoiceError::CorruptDocument {
                detail: "bad xref".into(),
            })
        }
    }

    /// Answers every query with `<page bytes>:<alias>`. Pages whose bytes
    /// start with `fail` get an HTTP 500; `slowN` sleeps N seconds first.
    struct EchoService {
        calls: AtomicUsize,
    }

    impl EchoService {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AnalysisService for EchoService {
        fn name(&self) -> &str {
            "echo"
        }

        async fn analyze(
            &self,
            request: AnalyzeRequest<'_>,
        ) -> Result<AnalyzeResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page = String::from_utf8_lossy(request.page_bytes).to_string();
            if let Some(secs) = page.strip_prefix("slow").and_then(|s| s.parse::<u64>().ok()) {
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            if page.starts_with("fail") {
                return Err(ServiceError::Status {
                    service: "echo",
                    status: 500,
                    message: "boom".into(),
                });
            }

            let mut blocks = Vec::new();
            for (i, q) in request.queries.iter().enumerate() {
                blocks.push(Block::query(&format!("q{i}"), &q.text, &q.alias, &[]));
            }
            for (i, q) in request.queries.iter().enumerate() {
                let text = format!("{}:{}", page, q.alias);
                blocks.push(Block::query_result(&format!("r{i}"), Some(&text)));
            }
            Ok(AnalyzeResponse { blocks })
        }
    }

    fn processor(service: Arc<EchoService>, concurrency: usize) -> DocumentProcessor {
        let config = ProcessingConfig::builder()
            .concurrency(concurrency)
            .build()
            .unwrap();
        DocumentProcessor::new(service, &config).with_renderer(Arc::new(SplitRenderer))
    }

    fn document(content: &[u8]) -> Document {
        Document::new(content.to_vec(), Some("application/pdf"), None).unwrap()
    }

    #[tokio::test]
    async fn single_image_yields_one_mapping() {
        let service = EchoService::new();
        let result = processor(Arc::clone(&service), 4)
            .process(document(b"only"))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        let page = &result.pages()[0];
        assert_eq!(page.len(), 6);
        assert_eq!(page.get("CNPJ"), Some("only:CNPJ"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_completion_keeps_page_order() {
        let result = processor(EchoService::new(), 4)
            .process(document(b"slow3|slow1|slow2|p4"))
            .await
            .unwrap();
        let prices: Vec<&str> = result.pages().iter().map(|p| p.get("price").unwrap()).collect();
        assert_eq!(
            prices,
            vec!["slow3:price", "slow1:price", "slow2:price", "p4:price"]
        );
    }

    #[tokio::test]
    async fn sequential_processing_matches_concurrent() {
        let a = processor(EchoService::new(), 1)
            .process(document(b"a|b|c"))
            .await
            .unwrap();
        let b = processor(EchoService::new(), 8)
            .process(document(b"a|b|c"))
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[tokio::test]
    async fn failing_page_fails_the_document() {
        let err = processor(EchoService::new(), 4)
            .process(document(b"p1|fail|p3"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
        match err {
            InvoiceError::AnalysisFailed { page, .. } => assert_eq!(page, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sequential_failure_stops_before_later_pages() {
        let service = EchoService::new();
        let err = processor(Arc::clone(&service), 1)
            .process(document(b"p1|fail|p3"))
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::AnalysisFailed { page: 2, .. }));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn render_failure_skips_extraction() {
        let service = EchoService::new();
        let config = ProcessingConfig::default();
        let err = DocumentProcessor::new(Arc::clone(&service) as Arc<dyn AnalysisService>, &config)
            .with_renderer(Arc::new(BrokenRenderer))
            .process(document(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_document_start(&self, total_pages: usize) {
            self.events.lock().unwrap().push(format!("start {total_pages}"));
        }
        fn on_page_complete(&self, page_num: usize, _: usize, field_count: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("page {page_num} {field_count}"));
        }
        fn on_page_error(&self, page_num: usize, _: usize, _: &str) {
            self.events.lock().unwrap().push(format!("error {page_num}"));
        }
        fn on_document_complete(&self, total_pages: usize) {
            self.events.lock().unwrap().push(format!("done {total_pages}"));
        }
    }

    #[tokio::test]
    async fn progress_events_are_reported() {
        let recorder = Arc::new(Recorder::default());
        let config = ProcessingConfig::builder()
            .concurrency(1)
            .progress_callback(recorder.clone())
            .build()
            .unwrap();
        DocumentProcessor::new(EchoService::new(), &config)
            .with_renderer(Arc::new(SplitRenderer))
            .process(document(b"a|b"))
            .await
            .unwrap();
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start 2", "page 1 6", "page 2 6", "done 2"]);

        let recorder = Arc::new(Recorder::default());
        let config = ProcessingConfig::builder()
            .concurrency(1)
            .progress_callback(recorder.clone())
            .build()
            .unwrap();
        DocumentProcessor::new(EchoService::new(), &config)
            .with_renderer(Arc::new(SplitRenderer))
            .process(document(b"fail"))
            .await
            .unwrap_err();
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start 1", "error 1"]);
    }
}
