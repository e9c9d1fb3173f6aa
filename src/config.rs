//! Configuration file and fixed timing constants
//!
//! The configuration is a JSON document loaded once at startup:
//!
//! ```json
//! {
//!   "network": {
//!     "mainnet": { "nodeUrl": "", "network": "mainnet", "ownerAddress": "0x..", "defaultOperator": [] }
//!   },
//!   "externalLink": "https://stake.example.org",
//!   "baseUrl": "https://directory.example.org/api/v1/validators/eth-ssv-operator"
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::domain::{Network, Operator, OwnerAddress};

/// How long a synchronized operator snapshot stays valid
pub const EXPIRATION_TIME: Duration = Duration::from_secs(60 * 60);

/// How often the expiration guard looks at the clock
pub const EXPIRATION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Timeout for requests to the directory service
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Provider whose operators are pinned into every cluster
pub const DEFAULT_PROVIDER: &str = "DxPool";

const OPERATOR_PATH: &str = "validators/eth-ssv-operator";
const NONCE_PATH: &str = "networks/eth/ssv-nonce";

/// Per-network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Execution node used by the nonce scan
    #[serde(default)]
    pub node_url: String,
    pub network: Network,
    pub owner_address: OwnerAddress,
    /// Operators merged into the directory listing as fallback candidates
    #[serde(default)]
    pub default_operator: Vec<Operator>,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub network: HashMap<Network, NetworkConfig>,
    #[serde(default)]
    pub external_link: String,
    /// Operator directory endpoint
    pub base_url: String,
    /// Nonce endpoint; derived from `base_url` when absent
    #[serde(default)]
    pub nonce_url: Option<String>,
    #[serde(default = "default_provider")]
    pub preferred_provider: String,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

impl AppConfig {
    /// Loads and validates a configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or fails validation
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency
    ///
    /// # Errors
    /// Returns an error if the base URL is empty or a network entry is keyed under the wrong name
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            bail!("baseUrl must not be empty");
        }
        for (key, entry) in &self.network {
            if *key != entry.network {
                bail!(
                    "Network entry '{key}' declares network '{}'",
                    entry.network
                );
            }
        }
        Ok(())
    }

    /// Settings for one network
    ///
    /// # Errors
    /// Returns an error if the network is not configured or has no owner address
    pub fn network(&self, network: Network) -> Result<&NetworkConfig> {
        let entry = self
            .network
            .get(&network)
            .ok_or_else(|| anyhow!("Network '{network}' is not configured"))?;
        if entry.owner_address.is_empty() {
            bail!("Network '{network}' has no ownerAddress configured");
        }
        Ok(entry)
    }

    /// Endpoint of the nonce scan
    ///
    /// # Errors
    /// Returns an error if `nonceUrl` is absent and cannot be derived from `baseUrl`
    pub fn nonce_url(&self) -> Result<String> {
        if let Some(url) = self.nonce_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.to_string());
        }
        let base = self.base_url.trim_end_matches('/');
        base.strip_suffix(OPERATOR_PATH)
            .map(|root| format!("{root}{NONCE_PATH}"))
            .ok_or_else(|| anyhow!("nonceUrl is not configured and cannot be derived from baseUrl"))
    }
}
