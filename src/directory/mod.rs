//! Operator directory: remote source, TTL-gated snapshot cache and logo cache

mod cache;
mod client;
mod logos;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Network, Operator};

pub use cache::{OperatorCache, OperatorCacheMeta};
pub use client::DirectoryClient;
pub use logos::{LogoCache, LogoKey};

/// Message shown when the directory cannot be reached at all
pub const NETWORK_ERROR_MESSAGE: &str = "Network error: Please check your internet connection.";

/// Message shown for every other directory failure
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Errors from the directory service
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Connection refused, DNS failure or timeout
    #[error("Directory unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid directory response: {0}")]
    InvalidResponse(String),

    #[error("Directory request failed: {0}")]
    Request(String),
}

impl DirectoryError {
    /// Text suitable for the operator running the tool
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            DirectoryError::Unreachable(_) => NETWORK_ERROR_MESSAGE,
            _ => UNEXPECTED_ERROR_MESSAGE,
        }
    }

    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DirectoryError::Unreachable(_))
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            DirectoryError::Unreachable(e.to_string())
        } else if e.is_decode() {
            DirectoryError::InvalidResponse(e.to_string())
        } else {
            DirectoryError::Request(e.to_string())
        }
    }
}

/// Server-side filters for a directory fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryQuery {
    pub network: Network,
    pub verified_only: bool,
    pub has_dkg_address: bool,
    pub search: Option<String>,
}

impl DirectoryQuery {
    /// Unfiltered query for a network
    pub fn new(network: Network) -> Self {
        Self {
            network,
            verified_only: false,
            has_dkg_address: false,
            search: None,
        }
    }

    /// Query-string parameters in the order the directory documents them
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("network_type", self.network.as_str().to_string())];
        if self.verified_only {
            params.push(("type", crate::domain::VERIFIED_OPERATOR.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("search", search.trim().to_string()));
        }
        if self.has_dkg_address {
            params.push(("has_dkg_address", "true".to_string()));
        }
        params
    }
}

/// Remote operator directory
#[async_trait]
pub trait OperatorSource: Send + Sync {
    /// Fetches the full matching operator set; no pagination
    async fn fetch_operators(&self, query: &DirectoryQuery) -> Result<Vec<Operator>, DirectoryError>;

    /// Fetches a logo and returns it as a `data:` URL
    async fn fetch_logo(&self, url: &str) -> Result<String, DirectoryError>;
}
