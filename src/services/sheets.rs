//! Google Sheets v4 `values.append` client.

use crate::error::ServiceError;
use crate::services::credentials::TokenSource;
use crate::services::{AppendResponse, SheetService};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "google-sheets";
const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/";

#[derive(Serialize)]
struct ValueRange<'a> {
    values: &'a [Vec<String>],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendValuesResponse {
    #[serde(default)]
    updates: Option<AppendResponse>,
}

/// Appends rows with `valueInputOption=RAW` and `insertDataOption=INSERT_ROWS`.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
}

impl GoogleSheetsClient {
    pub fn new(tokens: Arc<dyn TokenSource>, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;
        let base_url = Url::parse(DEFAULT_BASE_URL).map_err(|e| ServiceError::Transport {
            service: SERVICE,
            detail: e.to_string(),
        })?;
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    /// Talk to `base_url` instead of the public API host.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ServiceError> {
        self.base_url = Url::parse(base_url).map_err(|e| ServiceError::Transport {
            service: SERVICE,
            detail: format!("invalid base URL '{}': {}", base_url, e),
        })?;
        Ok(self)
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}:append?...`, with each
    /// segment percent-encoded.
    fn append_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport {
                service: SERVICE,
                detail: format!("base URL '{}' cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values"])
            .push(&format!("{}:append", range));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }
}

#[async_trait]
impl SheetService for GoogleSheetsClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<AppendResponse, ServiceError> {
        let url = self.append_url(spreadsheet_id, range)?;
        let token = self.tokens.access_token().await?;

        debug!("POST {} ({} rows)", url, values.len());

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&ValueRange { values: &values })
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: AppendValuesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, e))?;
        Ok(parsed.updates.unwrap_or_default())
    }
}

/// Google APIs wrap errors as `{"error": {"code", "message", "status"}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
