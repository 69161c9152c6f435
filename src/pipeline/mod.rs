//! Pipeline stages for invoice field extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the rendering backend or analysis service can be
//! swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ extract
//! (upload)  (pdfium)   (PNG)      (queries)
//! ```
//!
//! 1. [`input`]   wrap the uploaded bytes and resolve their media type
//! 2. [`render`]  split into page images; PDFs are rasterised in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]  PNG-encode each rasterised page
//! 4. [`extract`] one analysis call per page, answers paired with their
//!    field aliases; the only stage with network I/O

pub mod encode;
pub mod extract;
pub mod input;
pub mod render;
