//! Field extraction: ask the analysis service the configured questions about
//! one page and turn its block list into an alias → text mapping.
//!
//! ## Pairing
//!
//! The response is a flat list of blocks. Every submitted question comes back
//! as a `QUERY` block; every answer as a `QUERY_RESULT` block. With
//! [`PairingStrategy::Positional`] the i-th query block is paired with the
//! i-th result block, and the two streams must be the same length. With
//! [`PairingStrategy::Relationship`] each query block's `ANSWER` ids are
//! followed instead, so an unanswered question simply maps to `""`.
//!
//! Either way the returned map holds exactly one entry per configured query,
//! in declaration order.

use crate::config::{PairingStrategy, ProcessingConfig};
use crate::error::InvoiceError;
use crate::output::{ExtractionResult, FieldMap};
use crate::pipeline::input::Page;
use crate::queries::FieldQuerySet;
use crate::services::{AnalysisService, AnalyzeRequest, Block, BlockType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Runs one analysis call per page and pairs the answers.
#[derive(Clone)]
pub struct FieldExtractor {
    service: Arc<dyn AnalysisService>,
    queries: FieldQuerySet,
    timeout_secs: u64,
    pairing: PairingStrategy,
}

impl FieldExtractor {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        queries: FieldQuerySet,
        timeout_secs: u64,
        pairing: PairingStrategy,
    ) -> Self {
        Self {
            service,
            queries,
            timeout_secs,
            pairing,
        }
    }

    pub fn from_config(service: Arc<dyn AnalysisService>, config: &ProcessingConfig) -> Self {
        Self::new(
            service,
            config.queries.clone(),
            config.api_timeout_secs,
            config.pairing,
        )
    }

    pub fn queries(&self) -> &FieldQuerySet {
        &self.queries
    }

    /// Extract every configured field from one page.
    ///
    /// A single request is sent; it is never retried.
    pub async fn extract(&self, page: &Page) -> Result<ExtractionResult, InvoiceError> {
        let page_num = page.number();
        let start = Instant::now();

        let request = AnalyzeRequest {
            page_bytes: &page.image,
            queries: self.queries.as_slice(),
        };
        let call = self.service.analyze(request);
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| InvoiceError::AnalysisTimeout {
                page: page_num,
                secs: self.timeout_secs,
            })?
            .map_err(|source| InvoiceError::AnalysisFailed {
                page: page_num,
                source,
            })?;

        let fields = pair_blocks(page_num, &self.queries, &response.blocks, self.pairing)?;

        debug!(
            "Page {}: {} via {} in {:?}: {:?}",
            page_num,
            fields.len(),
            self.service.name(),
            start.elapsed(),
            fields
        );

        Ok(ExtractionResult::new(fields))
    }
}

/// Pair query blocks with their answers and re-key into declaration order.
pub fn pair_blocks(
    page_num: usize,
    queries: &FieldQuerySet,
    blocks: &[Block],
    strategy: PairingStrategy,
) -> Result<FieldMap, InvoiceError> {
    let answered = match strategy {
        PairingStrategy::Positional => pair_positional(page_num, blocks)?,
        PairingStrategy::Relationship => pair_by_relationship(page_num, blocks)?,
    };

    let mut seen: HashMap<&str, &str> = HashMap::with_capacity(answered.len());
    for (alias, text) in answered {
        if !queries.contains_alias(alias) {
            return Err(InvoiceError::MalformedResponse {
                page: page_num,
                detail: format!("unexpected alias '{}'", alias),
            });
        }
        if seen.insert(alias, text).is_some() {
            return Err(InvoiceError::MalformedResponse {
                page: page_num,
                detail: format!("alias '{}' answered twice", alias),
            });
        }
    }

    Ok(queries
        .aliases()
        .map(|alias| {
            let text = seen.get(alias).copied().unwrap_or_default();
            (alias.to_string(), text.to_string())
        })
        .collect())
}

fn alias_of(page_num: usize, block: &Block) -> Result<&str, InvoiceError> {
    block
        .query
        .as_ref()
        .and_then(|q| q.alias.as_deref())
        .ok_or_else(|| InvoiceError::MalformedResponse {
            page: page_num,
            detail: format!(
                "query block {} carries no alias",
                block.id.as_deref().unwrap_or("<no id>")
            ),
        })
}

fn pair_positional(page_num: usize, blocks: &[Block]) -> Result<Vec<(&str, &str)>, InvoiceError> {
    let query_blocks: Vec<&Block> = blocks
        .iter()
        .filter(|b| b.block_type == BlockType::Query)
        .collect();
    let result_blocks: Vec<&Block> = blocks
        .iter()
        .filter(|b| b.block_type == BlockType::QueryResult)
        .collect();

    if query_blocks.len() != result_blocks.len() {
        return Err(InvoiceError::MisalignedResponse {
            page: page_num,
            queries: query_blocks.len(),
            results: result_blocks.len(),
        });
    }

    query_blocks
        .into_iter()
        .zip(result_blocks)
        .map(|(q, r)| Ok((alias_of(page_num, q)?, r.text.as_deref().unwrap_or_default())))
        .collect()
}

fn pair_by_relationship(
    page_num: usize,
    blocks: &[Block],
) -> Result<Vec<(&str, &str)>, InvoiceError> {
    let results: HashMap<&str, &Block> = blocks
        .iter()
        .filter(|b| b.block_type == BlockType::QueryResult)
        .filter_map(|b| b.id.as_deref().map(|id| (id, b)))
        .collect();

    blocks
        .iter()
        .filter(|b| b.block_type == BlockType::Query)
        .map(|q| {
            let alias = alias_of(page_num, q)?;
            let text = q
                .answer_ids()
                .filter_map(|id| results.get(id))
                .find_map(|r| r.text.as_deref())
                .unwrap_or_default();
            Ok((alias, text))
        })
        .collect()
}
