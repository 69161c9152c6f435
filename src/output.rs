//! Result types returned to callers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field-name → extracted text, in field-declaration order.
pub type FieldMap = IndexMap<String, String>;

/// Extracted fields for one page.
///
/// Serialises as a plain JSON object. Keys keep the order in which they were
/// inserted, which for extractor output is the query declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionResult {
    fields: FieldMap,
}

impl ExtractionResult {
    pub fn new(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.fields.get(alias).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn into_fields(self) -> FieldMap {
        self.fields
    }

    /// Values in key order; one spreadsheet row.
    pub fn to_row(&self) -> Vec<String> {
        self.fields.values().cloned().collect()
    }
}

impl From<FieldMap> for ExtractionResult {
    fn from(fields: FieldMap) -> Self {
        Self::new(fields)
    }
}

/// Per-page results of one document, index-aligned with page ordinals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentResult {
    pages: Vec<ExtractionResult>,
}

impl DocumentResult {
    pub fn new(pages: Vec<ExtractionResult>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[ExtractionResult] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn into_pages(self) -> Vec<ExtractionResult> {
        self.pages
    }
}

impl IntoIterator for DocumentResult {
    type Item = ExtractionResult;
    type IntoIter = std::vec::IntoIter<ExtractionResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.pages.into_iter()
    }
}
