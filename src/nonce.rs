//! Registration nonce for one owner address
//!
//! The registry requires every new validator registration from an owner to carry
//! the next nonce. [`NonceSequencer`] holds that value for the session: it is seeded
//! once from a [`NonceScanner`] and then advanced by the pipeline exactly once per
//! persisted key share.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::directory::DirectoryError;
use crate::domain::{Network, OwnerAddress};

/// Parameters of a nonce scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRequest {
    pub network: Network,
    pub owner_address: OwnerAddress,
    pub node_url: String,
}

/// Looks up the next registration nonce of an owner
#[async_trait]
pub trait NonceScanner: Send + Sync {
    async fn scan(&self, request: &NonceRequest) -> Result<u64, DirectoryError>;
}

/// Current nonce for `(network, owner)`; never decreases while the session lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceSequencer {
    network: Network,
    owner: OwnerAddress,
    value: u64,
}

impl NonceSequencer {
    pub fn new(network: Network, owner: OwnerAddress, value: u64) -> Self {
        Self {
            network,
            owner,
            value,
        }
    }

    /// Seeds a sequencer from a scan
    ///
    /// # Errors
    /// Returns the scanner's error
    pub async fn scan<N>(scanner: &N, request: &NonceRequest) -> Result<Self, DirectoryError>
    where
        N: NonceScanner + ?Sized,
    {
        let value = scanner.scan(request).await?;
        Ok(Self::new(request.network, request.owner_address.clone(), value))
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.value
    }

    /// Moves to the next nonce and returns it
    ///
    /// Only call once the share bundle carrying [`current`](Self::current) is on disk.
    pub fn advance(&mut self) -> u64 {
        self.value += 1;
        debug!(owner = %self.owner, nonce = self.value, "Nonce advanced");
        self.value
    }

    /// Re-seeds from an external scan
    pub fn reset(&mut self, value: u64) {
        debug!(owner = %self.owner, from = self.value, to = value, "Nonce reset");
        self.value = value;
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    #[must_use]
    pub fn owner(&self) -> &OwnerAddress {
        &self.owner
    }
}
