//! TTL-gated operator snapshot

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{DirectoryError, DirectoryQuery, LogoCache, OperatorSource};
use crate::clock::Clock;
use crate::config::EXPIRATION_TIME;
use crate::domain::{Network, Operator};

/// Which network a snapshot belongs to and when it stops being usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorCacheMeta {
    pub network: Network,
    pub expires_at: DateTime<Utc>,
}

impl OperatorCacheMeta {
    /// Meta for a snapshot taken at `now`
    #[must_use]
    pub fn starting_at(network: Network, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            network,
            expires_at,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Usable only before expiry and only for the network it was fetched for
    #[must_use]
    pub fn is_valid(&self, network: Network, now: DateTime<Utc>) -> bool {
        self.network == network && !self.is_expired(now)
    }
}

/// Operator snapshot for one network plus its logos
pub struct OperatorCache<S> {
    source: S,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    operators: Vec<Operator>,
    meta: Option<OperatorCacheMeta>,
    logos: LogoCache,
}

impl<S: OperatorSource> OperatorCache<S> {
    pub fn new(source: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            ttl: EXPIRATION_TIME,
            operators: Vec::new(),
            meta: None,
            logos: LogoCache::new(),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Drops the snapshot and every logo, then pulls a fresh one from the source
    ///
    /// On failure the cache is left empty.
    ///
    /// # Errors
    /// Returns the source's error when the directory fetch fails
    pub async fn fetch(&mut self, query: &DirectoryQuery) -> Result<&[Operator], DirectoryError> {
        self.invalidate();

        let operators = self
            .source
            .fetch_operators(query)
            .await
            .inspect_err(|e| warn!(network = %query.network, error = %e, "Directory fetch failed"))?;

        let logos = self
            .logos
            .preload(&self.source, query.network, &operators)
            .await;

        let meta = OperatorCacheMeta::starting_at(query.network, self.clock.now(), self.ttl);
        info!(
            network = %query.network,
            operators = operators.len(),
            logos,
            expires_at = %meta.expires_at,
            "Operator snapshot synchronized"
        );

        self.operators = operators;
        self.meta = Some(meta);
        Ok(&self.operators)
    }

    /// Reinstates a snapshot saved earlier; it is still subject to its expiry
    pub fn restore(&mut self, operators: Vec<Operator>, meta: OperatorCacheMeta, logos: LogoCache) {
        self.operators = operators;
        self.meta = Some(meta);
        self.logos = logos;
    }

    pub fn invalidate(&mut self) {
        self.operators.clear();
        self.meta = None;
        self.logos.clear();
    }

    #[must_use]
    pub fn is_valid(&self, network: Network) -> bool {
        self.meta
            .is_some_and(|meta| meta.is_valid(network, self.clock.now()))
    }

    /// The snapshot, only while it is valid for `network`
    #[must_use]
    pub fn operators(&self, network: Network) -> Option<&[Operator]> {
        self.is_valid(network).then_some(self.operators.as_slice())
    }

    #[must_use]
    pub fn meta(&self) -> Option<OperatorCacheMeta> {
        self.meta
    }

    #[must_use]
    pub fn logos(&self) -> &LogoCache {
        &self.logos
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
