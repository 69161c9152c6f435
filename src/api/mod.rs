//! HTTP surface.
//!
//! | Route | Body | Success |
//! |-------|------|---------|
//! | `POST /detect-text` | multipart, field `file` | JSON array of field maps, page order |
//! | `POST /save-in-sheets` | JSON array of field maps | `{"status":"success","updatedCells":n}` |
//! | `GET /health` | none | `{"status":"ok","version":...}` |
//!
//! Every failure answers `{"error": "<message>"}`: 400 for caller mistakes,
//! 500 for everything else.

pub mod error;
pub mod handlers;
pub mod router;

pub use error::ApiError;
pub use router::{router, AppState};
