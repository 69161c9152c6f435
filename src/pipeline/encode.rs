//! Image encoding: `DynamicImage` → PNG bytes.
//!
//! PNG is lossless: JPEG artefacts around small digits (CNPJ, invoice
//! numbers) measurably hurt the analysis service's answers.

use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as PNG.
pub fn encode_page(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} PNG bytes",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
