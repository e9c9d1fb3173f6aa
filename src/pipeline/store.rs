//! Filesystem [`ShareStore`]

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::bundle::KeyShares;
use super::collaborators::ShareStore;
use crate::clock::Clock;

/// Writes each bundle to `<dir>/keyshare_<epochMillis>.json`
///
/// Existing files are never overwritten; on a name clash the millisecond suffix
/// is bumped until a free name is found.
pub struct FsShareStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FsShareStore {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(millis: i64) -> String {
        format!("keyshare_{millis}.json")
    }
}

#[async_trait]
impl ShareStore for FsShareStore {
    async fn persist(&self, bundle: &KeyShares) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let json = bundle.to_json().context("Failed to serialize key shares")?;
        let mut millis = self.clock.now().timestamp_millis();

        loop {
            let path = self.dir.join(Self::file_name(millis));
            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Key share file exists, bumping suffix");
                    millis += 1;
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create {}", path.display()));
                }
            };

            file.write_all(json.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            file.sync_all()
                .await
                .with_context(|| format!("Failed to sync {}", path.display()))?;
            return Ok(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{OperatorId, OwnerAddress};
    use crate::pipeline::bundle::{KeySharePayload, KeySharesData, KeySharesItem};

    fn bundle(nonce: u64) -> KeyShares {
        let item = KeySharesItem {
            data: KeySharesData::new(&OwnerAddress::new("0xowner"), nonce, "0xpub", &[]),
            payload: KeySharePayload {
                public_key: "0xpub".into(),
                operator_ids: vec![OperatorId::new(1)],
                shares_data: "0x".into(),
            },
        };
        KeyShares::new(item, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_persist_names_file_by_millis() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_millis_opt(1_767_225_600_123).unwrap(),
        ));
        let store = FsShareStore::new(dir.path().join("out"), clock);

        let path = store.persist(&bundle(5)).await.unwrap();

        assert_eq!(path, dir.path().join("out").join("keyshare_1767225600123.json"));
        let written: KeyShares =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.owner_nonce(), Some(5));
    }

    #[tokio::test]
    async fn test_same_millisecond_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.timestamp_millis_opt(1_000).unwrap()));
        let store = FsShareStore::new(dir.path(), clock);

        let first = store.persist(&bundle(1)).await.unwrap();
        let second = store.persist(&bundle(2)).await.unwrap();

        assert_ne!(first, second);
        assert!(second.ends_with("keyshare_1001.json"));
        let kept: KeyShares = serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(kept.owner_nonce(), Some(1));
    }
}
