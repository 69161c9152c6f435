//! Input normalisation: uploaded bytes + declared content type → [`Document`].
//!
//! Browsers and HTTP clients are inconsistent about the content type they
//! attach to an upload. A declared type of `application/pdf` or `image/*` is
//! trusted; a missing or generic one (`application/octet-stream`) is resolved
//! from the leading magic bytes so a PDF is never sent to the analysis service
//! unrendered.

use crate::error::InvoiceError;
use std::fmt;
use tracing::debug;

/// Media type of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
    Tiff,
    /// Anything else; passed through to the analysis service as-is.
    Other(String),
}

impl MediaType {
    /// Parse a declared `Content-Type` value, ignoring parameters and case.
    pub fn from_content_type(value: &str) -> Self {
        let essence = value
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => MediaType::Pdf,
            "image/png" => MediaType::Png,
            "image/jpeg" | "image/jpg" | "image/pjpeg" => MediaType::Jpeg,
            "image/tiff" | "image/tif" => MediaType::Tiff,
            _ => MediaType::Other(essence),
        }
    }

    /// Identify a media type from leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(MediaType::Pdf)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(MediaType::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(MediaType::Jpeg)
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            Some(MediaType::Tiff)
        } else {
            None
        }
    }

    /// Whether this is a container that must be split into page images.
    pub fn is_multi_page(&self) -> bool {
        matches!(self, MediaType::Pdf)
    }

    pub fn as_mime(&self) -> &str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Tiff => "image/tiff",
            MediaType::Other(s) => s,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// One uploaded file, alive for the duration of a single request.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: Vec<u8>,
    pub media_type: MediaType,
    pub name: Option<String>,
}

impl Document {
    /// Build a document from raw bytes and an optional declared content type.
    ///
    /// Empty content is rejected. A missing, generic or unrecognised declared
    /// type falls back to magic-byte sniffing.
    pub fn new(
        content: Vec<u8>,
        declared: Option<&str>,
        name: Option<String>,
    ) -> Result<Self, InvoiceError> {
        if content.is_empty() {
            return Err(InvoiceError::InvalidInput("uploaded file is empty".into()));
        }

        let declared_type = declared.map(MediaType::from_content_type);
        let media_type = match declared_type {
            Some(MediaType::Other(ref raw)) => {
                MediaType::sniff(&content).unwrap_or_else(|| MediaType::Other(raw.clone()))
            }
            Some(t) => t,
            None => MediaType::sniff(&content)
                .unwrap_or_else(|| MediaType::Other("application/octet-stream".into())),
        };

        debug!(
            "Document {:?}: {} bytes, declared {:?}, resolved {}",
            name,
            content.len(),
            declared,
            media_type
        );

        Ok(Self {
            content,
            media_type,
            name,
        })
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// One page image ready for analysis. `index` is the 0-based page ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub image: Vec<u8>,
}

impl Page {
    /// 1-indexed page number for logs and error messages.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}
