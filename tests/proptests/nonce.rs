//! Property tests for nonce allocation across a batch

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use quickcheck_macros::quickcheck;
use zeroize::Zeroizing;

use keysplit::clock::ManualClock;
use keysplit::domain::{ClusterSize, Network, Operator, OwnerAddress};
use keysplit::nonce::NonceSequencer;
use keysplit::pipeline::{
    EncryptedShare, JobOutcome, KeyPipeline, KeySharePayload, KeyShares, Keystore,
    KeystoreDecryptor, Ownership, ShareBuilder, ShareStore, ValidatorKeyPair,
};
use keysplit::selection::ClusterSnapshot;

/// Fails every keystore whose description is "bad"
struct Decryptor;

#[async_trait]
impl KeystoreDecryptor for Decryptor {
    async fn decrypt(&self, keystore: &Keystore, _password: &str) -> Result<ValidatorKeyPair> {
        if keystore.description == "bad" {
            bail!("bad keystore");
        }
        Ok(ValidatorKeyPair::new(keystore.pubkey.clone(), vec![3; 32]))
    }
}

struct Builder;

impl ShareBuilder for Builder {
    fn build_shares(&self, _private_key: &[u8], operators: &[Operator]) -> Result<Vec<EncryptedShare>> {
        Ok(operators
            .iter()
            .map(|op| EncryptedShare {
                operator_id: op.id,
                operator_key: String::new(),
                share_public_key: "0x".into(),
                encrypted_key: String::new(),
            })
            .collect())
    }

    fn build_payload(
        &self,
        public_key: &str,
        operators: &[Operator],
        _shares: &[EncryptedShare],
        _ownership: &Ownership<'_>,
    ) -> Result<KeySharePayload> {
        Ok(KeySharePayload {
            public_key: public_key.to_string(),
            operator_ids: operators.iter().map(|op| op.id).collect(),
            shares_data: "0x".into(),
        })
    }
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<u64>>>);

#[async_trait]
impl ShareStore for Recorder {
    async fn persist(&self, bundle: &KeyShares) -> Result<PathBuf> {
        let nonce = bundle.owner_nonce().unwrap_or_default();
        self.0.lock().unwrap().push(nonce);
        Ok(PathBuf::from(format!("keyshare_{nonce}.json")))
    }
}

fn keystore(index: usize, bad: bool) -> Keystore {
    Keystore {
        crypto: serde_json::Value::Null,
        description: if bad { "bad".into() } else { String::new() },
        pubkey: format!("{index:02x}"),
        path: String::new(),
        uuid: String::new(),
        version: 4,
    }
}

#[quickcheck]
fn prop_persisted_nonces_are_contiguous(start: u32, batch: u8, fail_at: Option<u8>) -> bool {
    let batch = usize::from(batch % 12);
    let fail_at = fail_at.map(|f| usize::from(f) % 16);
    let start = u64::from(start);

    let owner = OwnerAddress::new("0xowner");
    let cluster = ClusterSnapshot {
        network: Network::Mainnet,
        size: ClusterSize::default(),
        operators: (1..=4).map(|id| Operator::new(id, format!("Op {id}"))).collect(),
    };
    let keystores: Vec<Keystore> = (0..batch).map(|i| keystore(i, Some(i) == fail_at)).collect();

    let recorder = Recorder::default();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    let pipeline = KeyPipeline::new(Decryptor, Builder, recorder.clone(), clock);
    let mut nonce = NonceSequencer::new(Network::Mainnet, owner.clone(), start);

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let report = runtime
        .block_on(pipeline.run(
            keystores,
            cluster,
            &owner,
            &Zeroizing::new("pw".to_string()),
            &mut nonce,
        ))
        .unwrap();

    let expected_saved = fail_at.filter(|f| *f < batch).unwrap_or(batch);
    let saved = recorder.0.lock().unwrap().clone();
    let expected: Vec<u64> = (0..expected_saved as u64).map(|i| start + i).collect();

    let skipped_after_failure = report
        .jobs
        .iter()
        .skip(expected_saved + 1)
        .all(|job| job.outcome == JobOutcome::Skipped && job.nonce.is_none());

    saved == expected
        && nonce.current() == start + expected_saved as u64
        && report.next_nonce == nonce.current()
        && report.persisted_count() == expected_saved
        && report.is_complete() == (expected_saved == batch)
        && skipped_after_failure
}
