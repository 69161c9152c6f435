//! Service-account credentials for the spreadsheet API.
//!
//! A Google service-account key file is exchanged for short-lived bearer
//! tokens by `gcp_auth`, which signs the JWT-bearer assertion and caches each
//! token until shortly before it expires. The provider is built once at
//! start-up and shared.

use crate::error::ServiceError;
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

const SERVICE: &str = "google-oauth";

/// Anything that can hand out a bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, ServiceError>;
}

/// Bearer tokens for one service account and a fixed scope list.
pub struct ServiceAccountTokenProvider {
    account: CustomServiceAccount,
    scopes: Vec<String>,
}

impl ServiceAccountTokenProvider {
    /// Load the key file at `path` and build a provider for `scopes`.
    ///
    /// The private key is parsed here, so a bad key fails at start-up.
    pub fn from_file(path: impl AsRef<Path>, scopes: Vec<String>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let account = CustomServiceAccount::from_file(path).map_err(|e| credentials_error(
            format!("cannot load service account from '{}': {}", path.display(), e),
        ))?;
        info!("Service account loaded from {} ({} scopes)", path.display(), scopes.len());
        Ok(Self { account, scopes })
    }

    /// Same as [`Self::from_file`] for key JSON already in memory.
    pub fn from_json(json: &str, scopes: Vec<String>) -> Result<Self, ServiceError> {
        let account = CustomServiceAccount::from_json(json)
            .map_err(|e| credentials_error(format!("invalid service-account key: {}", e)))?;
        Ok(Self { account, scopes })
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

fn credentials_error(detail: String) -> ServiceError {
    ServiceError::Credentials {
        service: SERVICE,
        detail,
    }
}

impl fmt::Debug for ServiceAccountTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountTokenProvider")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, ServiceError> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let token = self
            .account
            .token(&scopes)
            .await
            .map_err(|e| credentials_error(format!("token request failed: {}", e)))?;
        debug!("Access token ready for {} scope(s)", scopes.len());
        Ok(token.as_str().to_string())
    }
}

/// A fixed token, for tests and pre-authorised deployments.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, ServiceError> {
        Ok(self.0.clone())
    }
}
