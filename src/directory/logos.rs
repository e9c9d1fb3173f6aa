//! Best-effort operator logo cache

use std::collections::HashMap;
use std::fmt;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::OperatorSource;
use crate::domain::{Network, Operator, OperatorId};

/// Operator ids are only unique within one network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogoKey {
    pub network: Network,
    pub operator: OperatorId,
}

impl fmt::Display for LogoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.network, self.operator)
    }
}

/// Logos as `data:` URLs; an empty string marks a logo that failed to resolve
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogoCache {
    entries: HashMap<String, String>,
}

impl LogoCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, network: Network, operator: OperatorId) -> Option<&str> {
        self.entries
            .get(&LogoKey { network, operator }.to_string())
            .map(String::as_str)
    }

    pub fn insert(&mut self, network: Network, operator: OperatorId, image: String) {
        self.entries
            .insert(LogoKey { network, operator }.to_string(), image);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves every uncached logo concurrently
    ///
    /// Failures are stored as empty placeholders and never surface as errors.
    /// Returns how many logos resolved to an image.
    pub async fn preload<S>(&mut self, source: &S, network: Network, operators: &[Operator]) -> usize
    where
        S: OperatorSource + ?Sized,
    {
        let missing: Vec<&Operator> = operators
            .iter()
            .filter(|op| self.get(network, op.id).is_none())
            .collect();

        let fetches = missing.iter().map(|op| async move {
            if op.logo.trim().is_empty() {
                return (op.id, String::new());
            }
            match source.fetch_logo(&op.logo).await {
                Ok(image) => (op.id, image),
                Err(e) => {
                    debug!(operator = %op.id, error = %e, "Logo unavailable, using placeholder");
                    (op.id, String::new())
                }
            }
        });

        let mut resolved = 0;
        for (id, image) in join_all(fetches).await {
            if !image.is_empty() {
                resolved += 1;
            }
            self.insert(network, id, image);
        }
        resolved
    }
}
