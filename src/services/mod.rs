//! External collaborators: the document-analysis and spreadsheet services.
//!
//! Both are reached through small async traits so the pipeline never knows
//! which backend it talks to. Production implementations:
//!
//! | Trait | Implementation | Wire |
//! |-------|----------------|------|
//! | [`AnalysisService`] | [`textract::TextractClient`] | `aws-sdk-textract`, default AWS credential chain |
//! | [`SheetService`] | [`sheets::GoogleSheetsClient`] | Sheets v4 REST, service-account bearer token |
//!
//! Handles are built once at start-up and shared behind `Arc`; they hold no
//! per-request state.

pub mod credentials;
pub mod sheets;
pub mod textract;

use crate::error::ServiceError;
use crate::queries::FieldQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use credentials::{ServiceAccountTokenProvider, StaticToken, TokenSource};
pub use sheets::GoogleSheetsClient;
pub use textract::TextractClient;

// ── Analysis ─────────────────────────────────────────────────────────────

/// One page and the queries to ask about it.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest<'a> {
    pub page_bytes: &'a [u8],
    pub queries: &'a [FieldQuery],
}

/// Flat block list returned by the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// Node type within an [`AnalyzeResponse`].
///
/// Only query nodes matter here; every other node type is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Query,
    QueryResult,
    #[serde(other)]
    Other,
}

/// The query echoed back on a `QUERY` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryEcho {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Link from one block to others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// One node of the analysis response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub block_type: BlockType,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub query: Option<QueryEcho>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Block {
    /// A `QUERY` node asking `alias`, answered by the blocks in `answer_ids`.
    pub fn query(id: &str, text: &str, alias: &str, answer_ids: &[&str]) -> Self {
        let relationships = if answer_ids.is_empty() {
            Vec::new()
        } else {
            vec![Relationship {
                kind: "ANSWER".to_string(),
                ids: answer_ids.iter().map(|s| s.to_string()).collect(),
            }]
        };
        Self {
            block_type: BlockType::Query,
            id: Some(id.to_string()),
            text: None,
            confidence: None,
            query: Some(QueryEcho {
                text: text.to_string(),
                alias: Some(alias.to_string()),
            }),
            relationships,
        }
    }

    /// A `QUERY_RESULT` node carrying `text`.
    pub fn query_result(id: &str, text: Option<&str>) -> Self {
        Self {
            block_type: BlockType::QueryResult,
            id: Some(id.to_string()),
            text: text.map(str::to_string),
            confidence: None,
            query: None,
            relationships: Vec::new(),
        }
    }

    /// IDs of the blocks this one points to with an `ANSWER` relationship.
    pub fn answer_ids(&self) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(|r| r.kind == "ANSWER")
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }
}

/// Query-based document analysis.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Analyse one page image with the given queries.
    async fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<AnalyzeResponse, ServiceError>;
}

// ── Spreadsheet ──────────────────────────────────────────────────────────

/// Counts confirmed by the spreadsheet service after an append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: u64,
    #[serde(default)]
    pub updated_cells: u64,
}

/// Row-append spreadsheet backend.
#[async_trait]
pub trait SheetService: Send + Sync {
    fn name(&self) -> &str;

    /// Append `values` (one inner vector per row) after `range` in `spreadsheet_id`.
    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<AppendResponse, ServiceError>;
}
