//! One operator's working session
//!
//! A [`Session`] owns everything that must stay consistent for a batch: the
//! operator snapshot, the nonce scanned for the configured owner, the selection in
//! progress and the expiration guard. Every entry point that starts new work first
//! checks that the snapshot is still fresh; a stale snapshot discards the
//! selection and the nonce and requires [`Session::synchronize`] again.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::config::NetworkConfig;
use crate::directory::{
    DirectoryError, DirectoryQuery, LogoCache, OperatorCache, OperatorCacheMeta, OperatorSource,
};
use crate::domain::{Network, Operator};
use crate::guard::{ExpirationGuard, GuardHandle};
use crate::nonce::{NonceRequest, NonceScanner, NonceSequencer};
use crate::pipeline::{
    KeyPipeline, Keystore, KeystoreDecryptor, PipelineError, PipelineReport, ShareBuilder,
    ShareStore,
};
use crate::selection::{SelectionEngine, SelectionError, merge_fallbacks};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Operator data expired, synchronize again")]
    CacheExpired,

    #[error("Not synchronized with the operator directory")]
    NotSynchronized,

    #[error("No cluster selection in progress")]
    NoSelection,

    #[error("Selection was made for {expected} key(s) but {actual} keystore(s) were given")]
    BatchSizeMismatch { expected: u64, actual: usize },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl SessionError {
    /// Text to show an operator
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Directory(e) => e.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

/// What a session needs to resume without re-fetching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSession {
    pub meta: OperatorCacheMeta,
    pub operators: Vec<Operator>,
    #[serde(default)]
    pub logos: LogoCache,
    pub nonce: NonceSequencer,
}

pub struct Session<S, N> {
    cache: OperatorCache<S>,
    scanner: N,
    config: NetworkConfig,
    provider: String,
    nonce: Option<NonceSequencer>,
    engine: Option<SelectionEngine>,
    meta_tx: watch::Sender<Option<OperatorCacheMeta>>,
    guard: Option<GuardHandle>,
}

impl<S, N> Session<S, N>
where
    S: OperatorSource,
    N: NonceScanner,
{
    pub fn new(cache: OperatorCache<S>, scanner: N, config: NetworkConfig, provider: impl Into<String>) -> Self {
        let (meta_tx, _) = watch::channel(cache.meta());
        Self {
            cache,
            scanner,
            config,
            provider: provider.into(),
            nonce: None,
            engine: None,
            meta_tx,
            guard: None,
        }
    }

    /// Runs the expiration guard for this session; must be called inside a tokio runtime
    pub fn start_guard(&mut self, interval: Duration) {
        let clock: Arc<dyn Clock> = Arc::clone(self.cache.clock());
        self.guard = Some(ExpirationGuard::spawn(self.meta_tx.subscribe(), clock, interval));
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.config.network
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Fetches a fresh snapshot and scans the owner's nonce
    ///
    /// Any selection in progress is discarded. Both steps must succeed for the
    /// session to become usable; returns the number of operators fetched.
    ///
    /// # Errors
    /// Returns the directory error of whichever step failed
    pub async fn synchronize(&mut self) -> Result<usize, SessionError> {
        self.engine = None;
        self.nonce = None;

        let network = self.config.network;
        let count = match self.cache.fetch(&DirectoryQuery::new(network)).await {
            Ok(operators) => operators.len(),
            Err(e) => {
                self.meta_tx.send_replace(None);
                return Err(e.into());
            }
        };

        let request = NonceRequest {
            network,
            owner_address: self.config.owner_address.clone(),
            node_url: self.config.node_url.clone(),
        };
        match NonceSequencer::scan(&self.scanner, &request).await {
            Ok(nonce) => {
                info!(%network, owner = %request.owner_address, nonce = nonce.current(), "Session synchronized");
                self.nonce = Some(nonce);
            }
            Err(e) => {
                warn!(%network, error = %e, "Nonce scan failed");
                self.cache.invalidate();
                self.meta_tx.send_replace(None);
                return Err(e.into());
            }
        }

        self.meta_tx.send_replace(self.cache.meta());
        Ok(count)
    }

    /// Reinstates a saved session; it is still subject to its expiry
    pub fn restore(&mut self, saved: SavedSession) {
        self.engine = None;
        self.cache.restore(saved.operators, saved.meta, saved.logos);
        self.nonce = Some(saved.nonce);
        self.meta_tx.send_replace(Some(saved.meta));
    }

    /// State needed to resume later, if the session is fresh
    #[must_use]
    pub fn save(&self) -> Option<SavedSession> {
        let nonce = self.nonce.clone()?;
        let meta = self.cache.meta()?;
        let operators = self.cache.operators(self.config.network)?.to_vec();
        Some(SavedSession {
            meta,
            operators,
            logos: self.cache.logos().clone(),
            nonce,
        })
    }

    /// Whether new work may start right now
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.nonce.is_some() && self.cache.is_valid(self.config.network)
    }

    /// The guard's expiry flag, if a guard is running
    ///
    /// The flag trails the clock by up to one check interval; [`Session::is_fresh`]
    /// is what gates new work.
    #[must_use]
    pub fn expiry(&self) -> Option<watch::Receiver<bool>> {
        self.guard.as_ref().map(GuardHandle::subscribe)
    }

    fn ensure_fresh(&mut self) -> Result<(), SessionError> {
        if self.is_fresh() {
            return Ok(());
        }
        if self.cache.meta().is_none() && self.nonce.is_none() {
            return Err(SessionError::NotSynchronized);
        }

        warn!(network = %self.config.network, "Operator snapshot expired, discarding selection");
        self.cache.invalidate();
        self.engine = None;
        self.nonce = None;
        self.meta_tx.send_replace(None);
        Err(SessionError::CacheExpired)
    }

    #[must_use]
    pub fn meta(&self) -> Option<OperatorCacheMeta> {
        self.cache.meta()
    }

    /// Current nonce, if synchronized
    #[must_use]
    pub fn nonce(&self) -> Option<u64> {
        self.nonce.as_ref().map(NonceSequencer::current)
    }

    #[must_use]
    pub fn logos(&self) -> &LogoCache {
        self.cache.logos()
    }

    /// The snapshot plus configured fallbacks
    ///
    /// # Errors
    /// Returns an error if the snapshot is missing or stale
    pub fn operators(&mut self) -> Result<Vec<Operator>, SessionError> {
        self.ensure_fresh()?;
        let mut operators = self
            .cache
            .operators(self.config.network)
            .ok_or(SessionError::NotSynchronized)?
            .to_vec();
        let added = merge_fallbacks(&mut operators, &self.config.default_operator);
        if added > 0 {
            info!(added, "Merged configured fallback operators");
        }
        Ok(operators)
    }

    /// Starts a new selection for a batch of `pending_keys` keys
    ///
    /// # Errors
    /// Returns an error if the snapshot is stale or no mandatory operator exists
    pub fn begin_selection(&mut self, pending_keys: u64) -> Result<&mut SelectionEngine, SessionError> {
        let operators = self.operators()?;
        let engine = SelectionEngine::new(self.config.network, operators, &self.provider, pending_keys)?;
        Ok(self.engine.insert(engine))
    }

    /// The selection in progress
    ///
    /// # Errors
    /// Returns an error if the snapshot went stale (the selection is then discarded)
    /// or no selection was started
    pub fn selection(&mut self) -> Result<&mut SelectionEngine, SessionError> {
        self.ensure_fresh()?;
        self.engine.as_mut().ok_or(SessionError::NoSelection)
    }

    /// Runs the pipeline over `keystores` with the current selection and nonce
    ///
    /// The selection is consumed by a run that started, whatever its outcome.
    ///
    /// # Errors
    /// Returns an error if the snapshot is stale, the selection is missing or
    /// incomplete, or the batch does not match the selection
    pub async fn generate<D, B, T>(
        &mut self,
        pipeline: &KeyPipeline<D, B, T>,
        keystores: Vec<Keystore>,
        password: &Zeroizing<String>,
    ) -> Result<PipelineReport, SessionError>
    where
        D: KeystoreDecryptor,
        B: ShareBuilder,
        T: ShareStore,
    {
        self.ensure_fresh()?;
        let engine = self.engine.as_ref().ok_or(SessionError::NoSelection)?;
        if usize::try_from(engine.pending_keys()).ok() != Some(keystores.len()) {
            return Err(SessionError::BatchSizeMismatch {
                expected: engine.pending_keys(),
                actual: keystores.len(),
            });
        }
        let snapshot = engine.clone().into_snapshot()?;

        let nonce = self.nonce.as_mut().ok_or(SessionError::NotSynchronized)?;
        self.engine = None;

        let report = pipeline
            .run(keystores, snapshot, &self.config.owner_address, password, nonce)
            .await?;
        Ok(report)
    }
}
