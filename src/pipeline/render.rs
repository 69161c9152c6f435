//! Page rendering: split a document into page images.
//!
//! Single-page images go through untouched. PDFs are rasterised page by page
//! with pdfium and PNG-encoded, in source page order.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. [`render_document`] moves the work onto tokio's blocking pool
//! so request handlers keep making progress while a large PDF renders.
//!
//! ## Binding
//!
//! pdfium is loaded from the renderer's explicit library path if one was
//! given, then from `PDFIUM_LIB_PATH` (a full path to `libpdfium.so`,
//! `libpdfium.dylib` or `pdfium.dll`), otherwise from the system library
//! search path.

use crate::config::ProcessingConfig;
use crate::error::InvoiceError;
use crate::pipeline::encode;
use crate::pipeline::input::{Document, Page};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Turns a [`Document`] into its ordered page images.
///
/// Implementations are synchronous; callers on an async runtime should go
/// through [`render_document`].
pub trait PageRenderer: Send + Sync {
    /// Render every page of `document` in source order.
    ///
    /// Fails as a whole: no partial page list is ever returned.
    fn render(&self, document: &Document) -> Result<Vec<Page>, InvoiceError>;
}

/// Run `renderer` on the blocking thread pool.
pub async fn render_document(
    renderer: Arc<dyn PageRenderer>,
    document: Arc<Document>,
) -> Result<Vec<Page>, InvoiceError> {
    tokio::task::spawn_blocking(move || renderer.render(&document))
        .await
        .map_err(|e| InvoiceError::Internal(format!("Render task panicked: {}", e)))?
}

/// The production renderer, backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumPageRenderer {
    dpi: u32,
    max_pixels: u32,
    max_page_bytes: usize,
    library_path: Option<PathBuf>,
}

impl PdfiumPageRenderer {
    pub fn new(dpi: u32, max_pixels: u32, max_page_bytes: usize) -> Self {
        Self {
            dpi,
            max_pixels,
            max_page_bytes,
            library_path: None,
        }
    }

    /// Bind pdfium from `path`, ignoring `PDFIUM_LIB_PATH`.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.dpi, config.max_rendered_pixels, config.max_page_bytes)
    }

    fn rasterise(&self, document: &Document) -> Result<Vec<Page>, InvoiceError> {
        let pdfium = bind_pdfium(self.library_path.as_deref())?;

        let pdf = pdfium
            .load_pdf_from_byte_slice(&document.content, None)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    InvoiceError::PasswordProtected
                } else {
                    InvoiceError::CorruptDocument { detail: err_str }
                }
            })?;

        let pages = pdf.pages();
        let total_pages = pages.len() as usize;
        if total_pages == 0 {
            return Err(InvoiceError::EmptyDocument);
        }
        info!("PDF loaded: {} pages, rendering at {} DPI", total_pages, self.dpi);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut results = Vec::with_capacity(total_pages);

        for (index, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                InvoiceError::RasterisationFailed {
                    page: index + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let png = encode::encode_page(&image).map_err(|e| InvoiceError::EncodeFailed {
                page: index + 1,
                detail: e.to_string(),
            })?;

            if png.len() > self.max_page_bytes {
                return Err(InvoiceError::PageTooLarge {
                    page: index + 1,
                    size: png.len(),
                    limit: self.max_page_bytes,
                });
            }

            debug!(
                "Rendered page {} → {}x{} px, {} bytes",
                index + 1,
                image.width(),
                image.height(),
                png.len()
            );

            results.push(Page { index, image: png });
        }

        Ok(results)
    }
}

impl Default for PdfiumPageRenderer {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

impl PageRenderer for PdfiumPageRenderer {
    fn render(&self, document: &Document) -> Result<Vec<Page>, InvoiceError> {
        if !document.media_type.is_multi_page() {
            debug!("{} input passed through as a single page", document.media_type);
            return Ok(vec![Page {
                index: 0,
                image: document.content.clone(),
            }]);
        }
        self.rasterise(document)
    }
}

/// Bind to pdfium from `library`, else [`PDFIUM_LIB_PATH_ENV`], else the system.
pub fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, InvoiceError> {
    let explicit = library.map(Path::to_path_buf).or_else(|| {
        std::env::var_os(PDFIUM_LIB_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    });
    let bindings = match explicit {
        Some(path) => Pdfium::bind_to_library(&path).map_err(|e| {
            InvoiceError::PdfiumBindingFailed(format!("{}: {:?}", path.display(), e))
        })?,
        None => Pdfium::bind_to_system_library()
            .map_err(|e| InvoiceError::PdfiumBindingFailed(format!("{:?}", e)))?,
    };
    Ok(Pdfium::new(bindings))
}
