//! Sequential key-share pipeline
//!
//! Each keystore of a batch goes through the same steps, strictly in order:
//!
//! 1. decrypt the keystore with the batch password
//! 2. split the private key into one encrypted share per cluster member
//! 3. build the registration payload bound to the owner and the current nonce
//! 4. persist the bundle
//! 5. advance the nonce
//!
//! The first failure stops the batch. Files already written and nonces already
//! consumed stay as they are; the remaining keys are reported as skipped.

mod bundle;
mod collaborators;
mod store;
mod threshold;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::domain::{Network, OwnerAddress};
use crate::nonce::NonceSequencer;
use crate::selection::ClusterSnapshot;

pub use bundle::{KEYSHARES_VERSION, KeySharePayload, KeyShares, KeySharesData, KeySharesItem, OperatorKey};
pub use collaborators::{
    EncryptedShare, Keystore, KeystoreDecryptor, Ownership, ShareBuilder, ShareCipher, ShareStore,
    ValidatorKeyPair,
};
pub use store::FsShareStore;
pub use threshold::ThresholdShareBuilder;

/// Why a batch stopped
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("key #{}: failed to decrypt keystore", .index + 1)]
    Decryption {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("key #{}: failed to build key shares", .index + 1)]
    ShareConstruction {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("key #{}: failed to save key shares", .index + 1)]
    Persistence {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Nonce belongs to {nonce_owner} on {nonce_network}, batch is for {owner} on {network}")]
    NonceScope {
        owner: OwnerAddress,
        network: Network,
        nonce_owner: OwnerAddress,
        nonce_network: Network,
    },
}

impl PipelineError {
    /// 0-based index of the failing key, if a key failed
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            PipelineError::Decryption { index, .. }
            | PipelineError::ShareConstruction { index, .. }
            | PipelineError::Persistence { index, .. } => Some(*index),
            PipelineError::NonceScope { .. } => None,
        }
    }

    /// The error with its whole cause chain, for display
    #[must_use]
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        detail
    }
}

/// What happened to one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Pending,
    Persisted(PathBuf),
    Failed(String),
    Skipped,
}

/// One keystore of a batch
#[derive(Debug, Clone)]
pub struct KeyJob {
    /// 0-based position in the batch
    pub index: usize,
    pub keystore: Keystore,
    pub cluster: Arc<ClusterSnapshot>,
    /// Nonce the job was built with; set once processing starts
    pub nonce: Option<u64>,
    pub outcome: JobOutcome,
}

impl KeyJob {
    pub fn new(index: usize, keystore: Keystore, cluster: Arc<ClusterSnapshot>) -> Self {
        Self {
            index,
            keystore,
            cluster,
            nonce: None,
            outcome: JobOutcome::Pending,
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("key #{}", self.index + 1)
    }

    #[must_use]
    pub fn is_persisted(&self) -> bool {
        matches!(self.outcome, JobOutcome::Persisted(_))
    }
}

/// Result of one batch
#[derive(Debug)]
pub struct PipelineReport {
    pub jobs: Vec<KeyJob>,
    /// Sequencer value when the batch started
    pub start_nonce: u64,
    /// Sequencer value when the batch stopped
    pub next_nonce: u64,
    pub failure: Option<PipelineError>,
}

impl PipelineReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Stopped by a failure after at least one key was saved
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.failure.is_some() && self.persisted_count() > 0
    }

    #[must_use]
    pub fn persisted_count(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_persisted()).count()
    }

    #[must_use]
    pub fn persisted_paths(&self) -> Vec<&PathBuf> {
        self.jobs
            .iter()
            .filter_map(|job| match &job.outcome {
                JobOutcome::Persisted(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn failed_index(&self) -> Option<usize> {
        self.failure.as_ref().and_then(PipelineError::index)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(
                f,
                "{} key share file(s) saved, next nonce {}",
                self.persisted_count(),
                self.next_nonce
            ),
            Some(e) => write!(
                f,
                "{} of {} key share file(s) saved before {}; next nonce {}",
                self.persisted_count(),
                self.jobs.len(),
                e.detail(),
                self.next_nonce
            ),
        }
    }
}

/// Drives a batch through the collaborators
pub struct KeyPipeline<D, B, S> {
    decryptor: D,
    builder: B,
    store: S,
    clock: Arc<dyn Clock>,
}

impl<D, B, S> KeyPipeline<D, B, S>
where
    D: KeystoreDecryptor,
    B: ShareBuilder,
    S: ShareStore,
{
    pub fn new(decryptor: D, builder: B, store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            decryptor,
            builder,
            store,
            clock,
        }
    }

    /// Processes `keystores` in order against one cluster
    ///
    /// Job failures end up in the returned report, not in the `Err` branch.
    ///
    /// # Errors
    /// Returns an error before touching any key if `nonce` is scoped to another owner or network
    pub async fn run(
        &self,
        keystores: Vec<Keystore>,
        cluster: ClusterSnapshot,
        owner: &OwnerAddress,
        password: &Zeroizing<String>,
        nonce: &mut NonceSequencer,
    ) -> Result<PipelineReport, PipelineError> {
        if nonce.owner() != owner || nonce.network() != cluster.network {
            return Err(PipelineError::NonceScope {
                owner: owner.clone(),
                network: cluster.network,
                nonce_owner: nonce.owner().clone(),
                nonce_network: nonce.network(),
            });
        }

        let cluster = Arc::new(cluster);
        let mut jobs: Vec<KeyJob> = keystores
            .into_iter()
            .enumerate()
            .map(|(index, keystore)| KeyJob::new(index, keystore, Arc::clone(&cluster)))
            .collect();

        let start_nonce = nonce.current();
        info!(
            keys = jobs.len(),
            operators = ?cluster.ids(),
            nonce = start_nonce,
            "Starting key share batch"
        );

        let mut failure = None;
        for job in &mut jobs {
            if failure.is_some() {
                job.outcome = JobOutcome::Skipped;
                continue;
            }

            let current = nonce.current();
            job.nonce = Some(current);
            match self.process(job, owner, password, current).await {
                Ok(path) => {
                    info!(key = %job.label(), nonce = current, path = %path.display(), "Key share saved");
                    job.outcome = JobOutcome::Persisted(path);
                    nonce.advance();
                }
                Err(e) => {
                    warn!(key = %job.label(), nonce = current, error = %e.detail(), "Key share batch stopped");
                    job.outcome = JobOutcome::Failed(e.detail());
                    failure = Some(e);
                }
            }
        }

        Ok(PipelineReport {
            jobs,
            start_nonce,
            next_nonce: nonce.current(),
            failure,
        })
    }

    async fn process(
        &self,
        job: &KeyJob,
        owner: &OwnerAddress,
        password: &Zeroizing<String>,
        nonce: u64,
    ) -> Result<PathBuf, PipelineError> {
        let index = job.index;
        let operators = &job.cluster.operators;

        let keys = self
            .decryptor
            .decrypt(&job.keystore, password)
            .await
            .map_err(|source| PipelineError::Decryption { index, source })?;

        let shares = self
            .builder
            .build_shares(keys.private_key(), operators)
            .map_err(|source| PipelineError::ShareConstruction { index, source })?;

        let ownership = Ownership {
            owner,
            nonce,
            private_key: keys.private_key(),
        };
        let payload = self
            .builder
            .build_payload(keys.public_key(), operators, &shares, &ownership)
            .map_err(|source| PipelineError::ShareConstruction { index, source })?;

        let item = KeySharesItem {
            data: KeySharesData::new(owner, nonce, keys.public_key(), &shares),
            payload,
        };
        let bundle = KeyShares::new(item, self.clock.now());

        self.store
            .persist(&bundle)
            .await
            .map_err(|source| PipelineError::Persistence { index, source })
    }
}
