//! Field queries sent to the analysis service with every page.
//!
//! Every question the service is asked lives here, next to the alias under
//! which its answer is reported. The set is fixed per process: the built-in
//! [`FieldQuerySet::invoice_defaults`] unless the CLI is given `--queries` or
//! a library caller passes another set to
//! [`crate::config::ProcessingConfigBuilder::queries`].
//!
//! Declaration order matters. It is the key order of every
//! [`crate::output::ExtractionResult`] and therefore the column order of the
//! rows appended to the spreadsheet.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Maximum number of queries the analysis service accepts per page.
pub const MAX_QUERIES: usize = 15;

/// Built-in invoice queries as `(question, alias)` pairs.
pub const INVOICE_QUERIES: &[(&str, &str)] = &[
    (
        "What is the CNPJ number (company identifier) listed in the header of the invoice?",
        "CNPJ",
    ),
    (
        "What is the total value of the invoice in currency (R$)?",
        "price",
    ),
    (
        "What is the full legal name of the company that created the invoice?",
        "company",
    ),
    ("What is the date when the invoice was created?", "date"),
    (
        "What is the unique DANFE number shown on the invoice?",
        "invoice_number",
    ),
    (
        "What is the series number of the invoice (labeled as Serie)?",
        "invoice_series",
    ),
];

/// One question and the alias its answer is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldQuery {
    pub text: String,
    pub alias: String,
}

impl FieldQuery {
    pub fn new(text: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alias: alias.into(),
        }
    }
}

/// Reasons a query list is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query list is empty")]
    Empty,

    #[error("{count} queries exceed the per-page limit of {MAX_QUERIES}")]
    TooMany { count: usize },

    #[error("query {index} has a blank question or alias")]
    Blank { index: usize },

    #[error("alias '{alias}' appears more than once")]
    DuplicateAlias { alias: String },
}

/// A validated, ordered list of [`FieldQuery`] with unique aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldQuerySet {
    queries: Vec<FieldQuery>,
}

impl FieldQuerySet {
    /// Validate `queries` and wrap them.
    pub fn new(queries: Vec<FieldQuery>) -> Result<Self, QueryError> {
        if queries.is_empty() {
            return Err(QueryError::Empty);
        }
        if queries.len() > MAX_QUERIES {
            return Err(QueryError::TooMany {
                count: queries.len(),
            });
        }

        let mut seen = HashSet::with_capacity(queries.len());
        for (index, q) in queries.iter().enumerate() {
            if q.text.trim().is_empty() || q.alias.trim().is_empty() {
                return Err(QueryError::Blank { index });
            }
            if !seen.insert(q.alias.as_str()) {
                return Err(QueryError::DuplicateAlias {
                    alias: q.alias.clone(),
                });
            }
        }

        Ok(Self { queries })
    }

    /// The six invoice queries the service ships with.
    pub fn invoice_defaults() -> Self {
        Self {
            queries: INVOICE_QUERIES
                .iter()
                .map(|(text, alias)| FieldQuery::new(*text, *alias))
                .collect(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldQuery> {
        self.queries.iter()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn as_slice(&self) -> &[FieldQuery] {
        &self.queries
    }

    /// Aliases in declaration order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.queries.iter().map(|q| q.alias.as_str())
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.queries.iter().any(|q| q.alias == alias)
    }
}

impl Default for FieldQuerySet {
    fn default() -> Self {
        Self::invoice_defaults()
    }
}

impl<'a> IntoIterator for &'a FieldQuerySet {
    type Item = &'a FieldQuery;
    type IntoIter = std::slice::Iter<'a, FieldQuery>;

    fn into_iter(self) -> Self::IntoIter {
        self.queries.iter()
    }
}
