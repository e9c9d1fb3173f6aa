//! Shamir-based [`ShareBuilder`]

use anyhow::{Context, Result, bail, ensure};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use blahaj::Sharks;
use zeroize::Zeroizing;

use super::bundle::KeySharePayload;
use super::collaborators::{EncryptedShare, Ownership, ShareBuilder, ShareCipher};
use crate::domain::{ClusterSize, Operator};

/// Splits a validator key so any `n - f` operators of an `n = 3f + 1` cluster can rebuild it
///
/// Sharing is done here; the cryptography around each share is delegated to `C`.
#[derive(Debug, Clone)]
pub struct ThresholdShareBuilder<C> {
    cipher: C,
}

impl<C: ShareCipher> ThresholdShareBuilder<C> {
    pub fn new(cipher: C) -> Self {
        Self { cipher }
    }

    fn cluster_size(operators: &[Operator]) -> Result<ClusterSize> {
        let count = u8::try_from(operators.len())
            .with_context(|| format!("Too many operators: {}", operators.len()))?;
        ClusterSize::new(count)
    }
}

fn strip_hex(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

impl<C: ShareCipher> ShareBuilder for ThresholdShareBuilder<C> {
    fn build_shares(&self, private_key: &[u8], operators: &[Operator]) -> Result<Vec<EncryptedShare>> {
        ensure!(!private_key.is_empty(), "Private key is empty");
        let size = Self::cluster_size(operators)?;

        let sharks = Sharks(size.threshold());
        let dealer = sharks.dealer(private_key);

        let mut encrypted = Vec::with_capacity(operators.len());
        for (operator, share) in operators.iter().zip(dealer) {
            if operator.public_key.trim().is_empty() {
                bail!("Operator {} has no public key", operator.id);
            }
            let share_bytes = Zeroizing::new(Vec::from(&share));

            let share_public_key = self
                .cipher
                .share_public_key(&share_bytes)
                .with_context(|| format!("Failed to derive share public key for operator {}", operator.id))?;
            let sealed = self
                .cipher
                .encrypt(operator, &share_bytes)
                .with_context(|| format!("Failed to encrypt share for operator {}", operator.id))?;

            encrypted.push(EncryptedShare {
                operator_id: operator.id,
                operator_key: operator.public_key.clone(),
                share_public_key: format!("0x{}", hex::encode(share_public_key)),
                encrypted_key: STANDARD.encode(sealed),
            });
        }

        Ok(encrypted)
    }

    fn build_payload(
        &self,
        public_key: &str,
        operators: &[Operator],
        shares: &[EncryptedShare],
        ownership: &Ownership<'_>,
    ) -> Result<KeySharePayload> {
        ensure!(
            shares.len() == operators.len(),
            "Expected {} shares, got {}",
            operators.len(),
            shares.len()
        );
        for (operator, share) in operators.iter().zip(shares) {
            ensure!(
                operator.id == share.operator_id,
                "Share for operator {} is out of order (expected {})",
                share.operator_id,
                operator.id
            );
        }

        let signature = self
            .cipher
            .sign_ownership(ownership.private_key, ownership.owner, ownership.nonce)
            .context("Failed to sign ownership")?;

        let mut shares_data = format!("0x{}", hex::encode(signature));
        for share in shares {
            shares_data.push_str(strip_hex(&share.share_public_key));
        }
        for share in shares {
            let sealed = STANDARD
                .decode(&share.encrypted_key)
                .with_context(|| format!("Encrypted share for operator {} is not base64", share.operator_id))?;
            shares_data.push_str(&hex::encode(sealed));
        }

        Ok(KeySharePayload {
            public_key: public_key.to_string(),
            operator_ids: operators.iter().map(|op| op.id).collect(),
            shares_data,
        })
    }
}
