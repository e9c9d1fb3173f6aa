//! HTTP client for the directory service

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{DirectoryError, DirectoryQuery, OperatorSource};
use crate::config::{AppConfig, REQUEST_TIMEOUT};
use crate::domain::Operator;
use crate::nonce::{NonceRequest, NonceScanner};

#[derive(Deserialize)]
struct OperatorPage {
    items: Vec<Operator>,
}

/// Nonce responses come either bare or wrapped
#[derive(Deserialize)]
#[serde(untagged)]
enum NonceResponse {
    Bare(u64),
    Field { nonce: u64 },
    Wrapped { data: NonceField },
}

#[derive(Deserialize)]
struct NonceField {
    nonce: u64,
}

impl NonceResponse {
    fn nonce(&self) -> u64 {
        match self {
            NonceResponse::Bare(n) | NonceResponse::Field { nonce: n } => *n,
            NonceResponse::Wrapped { data } => data.nonce,
        }
    }
}

/// reqwest-backed [`OperatorSource`] and [`NonceScanner`]
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    operators_url: String,
    nonce_url: String,
}

impl DirectoryClient {
    /// Create a client for the given endpoints
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialised
    pub fn new(
        operators_url: impl Into<String>,
        nonce_url: impl Into<String>,
    ) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("keysplit/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            operators_url: operators_url.into(),
            nonce_url: nonce_url.into(),
        })
    }

    /// Create a client from the application configuration
    ///
    /// # Errors
    /// Returns an error if the nonce endpoint cannot be determined or the client cannot be built
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.base_url.clone(), config.nonce_url()?)?)
    }

    async fn get(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<reqwest::Response, DirectoryError> {
        let response = self.http.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl OperatorSource for DirectoryClient {
    async fn fetch_operators(&self, query: &DirectoryQuery) -> Result<Vec<Operator>, DirectoryError> {
        debug!(url = %self.operators_url, network = %query.network, "Fetching operator directory");

        let page: OperatorPage = self
            .get(&self.operators_url, &query.params())
            .await?
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;

        debug!(count = page.items.len(), "Operator directory fetched");
        Ok(page.items)
    }

    async fn fetch_logo(&self, url: &str) -> Result<String, DirectoryError> {
        let response = self.get(url, &[]).await?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?;
        Ok(format!("data:{mime};base64,{}", STANDARD.encode(&bytes)))
    }
}

#[async_trait]
impl NonceScanner for DirectoryClient {
    async fn scan(&self, request: &NonceRequest) -> Result<u64, DirectoryError> {
        let params = [
            ("network", request.network.as_str().to_string()),
            ("owner_address", request.owner_address.to_string()),
            ("node_url", request.node_url.clone()),
        ];

        let body: serde_json::Value = self
            .get(&self.nonce_url, &params)
            .await?
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;

        let nonce = serde_json::from_value::<NonceResponse>(body)
            .map(|r| r.nonce())
            .map_err(|e| {
                warn!(owner = %request.owner_address, "Unrecognised nonce response");
                DirectoryError::InvalidResponse(e.to_string())
            })?;

        debug!(owner = %request.owner_address, nonce, "Nonce scanned");
        Ok(nonce)
    }
}
