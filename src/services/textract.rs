//! AWS Textract `AnalyzeDocument` client (QUERIES feature).
//!
//! Thin adapter over `aws-sdk-textract`: one call per page with the image
//! inlined, the SDK's blocks mapped onto [`AnalyzeResponse`]. Credentials and
//! region come from the default AWS chain (environment, shared config and
//! credentials files, profiles, container and instance roles).
//!
//! SDK retries are disabled; a failed page fails its document.

use crate::error::ServiceError;
use crate::services::{
    AnalysisService, AnalyzeRequest, AnalyzeResponse, Block, BlockType, QueryEcho, Relationship,
};
use async_trait::async_trait;
use aws_sdk_textract::config::retry::RetryConfig;
use aws_sdk_textract::config::timeout::TimeoutConfig;
use aws_sdk_textract::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_textract::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_textract::operation::analyze_document::AnalyzeDocumentError;
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "textract";

/// Textract client bound to one region.
#[derive(Debug, Clone)]
pub struct TextractClient {
    client: aws_sdk_textract::Client,
}

impl TextractClient {
    /// Client resolved from the default AWS provider chain.
    ///
    /// Fails only when no region can be found; credentials are resolved
    /// lazily on the first call.
    pub async fn from_env(timeout: Duration) -> Result<Self, ServiceError> {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        if shared.region().is_none() {
            return Err(ServiceError::Credentials {
                service: SERVICE,
                detail: "no AWS region configured (AWS_REGION, profile or instance metadata)"
                    .into(),
            });
        }
        let config = aws_sdk_textract::config::Builder::from(&shared)
            .retry_config(RetryConfig::disabled())
            .timeout_config(operation_timeout(timeout))
            .build();
        Ok(Self::from_conf(config))
    }

    /// Client with fixed credentials, bypassing the provider chain.
    pub fn with_credentials(
        region: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        let config = aws_sdk_textract::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(operation_timeout(timeout))
            .build();
        Self::from_conf(config)
    }

    pub fn from_conf(config: aws_sdk_textract::Config) -> Self {
        Self {
            client: aws_sdk_textract::Client::from_conf(config),
        }
    }

    /// Send requests to `endpoint` instead of the regional default.
    ///
    /// A path prefix on `endpoint` is kept and signed.
    pub fn with_endpoint(self, endpoint: &str) -> Result<Self, ServiceError> {
        Url::parse(endpoint).map_err(|e| ServiceError::Transport {
            service: SERVICE,
            detail: format!("invalid endpoint '{}': {}", endpoint, e),
        })?;
        let config = self
            .client
            .config()
            .to_builder()
            .endpoint_url(endpoint)
            .build();
        Ok(Self::from_conf(config))
    }

    pub fn region(&self) -> &str {
        self.client
            .config()
            .region()
            .map(|r| r.as_ref())
            .unwrap_or("unknown")
    }
}

fn operation_timeout(timeout: Duration) -> TimeoutConfig {
    TimeoutConfig::builder().operation_timeout(timeout).build()
}

#[async_trait]
impl AnalysisService for TextractClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<AnalyzeResponse, ServiceError> {
        let queries = request
            .queries
            .iter()
            .map(|q| types::Query::builder().text(&q.text).alias(&q.alias).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServiceError::Transport {
                service: SERVICE,
                detail: format!("invalid query: {}", e),
            })?;
        let queries_config = types::QueriesConfig::builder()
            .set_queries(Some(queries))
            .build()
            .map_err(|e| ServiceError::Transport {
                service: SERVICE,
                detail: format!("invalid query config: {}", e),
            })?;

        debug!(
            "AnalyzeDocument ({} query/ies, {} page bytes)",
            request.queries.len(),
            request.page_bytes.len()
        );

        let output = self
            .client
            .analyze_document()
            .document(
                types::Document::builder()
                    .bytes(Blob::new(request.page_bytes.to_vec()))
                    .build(),
            )
            .feature_types(types::FeatureType::Queries)
            .queries_config(queries_config)
            .send()
            .await
            .map_err(from_sdk_error)?;

        Ok(AnalyzeResponse {
            blocks: output.blocks().iter().map(convert_block).collect(),
        })
    }
}

fn convert_block(block: &types::Block) -> Block {
    let block_type = match block.block_type() {
        Some(types::BlockType::Query) => BlockType::Query,
        Some(types::BlockType::QueryResult) => BlockType::QueryResult,
        _ => BlockType::Other,
    };
    Block {
        block_type,
        id: block.id().map(str::to_string),
        text: block.text().map(str::to_string),
        confidence: block.confidence(),
        query: block.query().map(|q| QueryEcho {
            text: q.text().to_string(),
            alias: q.alias().map(str::to_string),
        }),
        relationships: block
            .relationships()
            .iter()
            .map(|r| Relationship {
                kind: r.r#type().map(|t| t.as_str().to_string()).unwrap_or_default(),
                ids: r.ids().to_vec(),
            })
            .collect(),
    }
}

fn from_sdk_error(err: SdkError<AnalyzeDocumentError>) -> ServiceError {
    match &err {
        SdkError::TimeoutError(_) => ServiceError::Timeout { service: SERVICE },
        SdkError::ServiceError(context) => ServiceError::Status {
            service: SERVICE,
            status: context.raw().status().as_u16(),
            message: error_message(context.err()),
        },
        SdkError::ResponseError(_) => ServiceError::Decode {
            service: SERVICE,
            detail: DisplayErrorContext(&err).to_string(),
        },
        _ => ServiceError::Transport {
            service: SERVICE,
            detail: DisplayErrorContext(&err).to_string(),
        },
    }
}

/// `Code: message` from the modelled error, whichever parts are present.
fn error_message(err: &AnalyzeDocumentError) -> String {
    match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => err.to_string(),
    }
}
