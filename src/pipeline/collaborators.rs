//! Boundaries to the cryptographic collaborators
//!
//! Keystore decryption, per-operator encryption and ownership signing live outside
//! this crate. The pipeline only sees them through these traits.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::bundle::{KeySharePayload, KeyShares};
use crate::domain::{Operator, OperatorId, OwnerAddress};

/// An encrypted validator keystore (EIP-2335 layout)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keystore {
    pub crypto: serde_json::Value,
    #[serde(default)]
    pub description: String,
    /// Validator public key, hex without prefix
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub version: u32,
}

impl Keystore {
    /// Parses a keystore file's contents
    ///
    /// # Errors
    /// Returns an error if the text is not a keystore document
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// A decrypted validator key; the private half is wiped on drop
pub struct ValidatorKeyPair {
    public_key: String,
    private_key: Zeroizing<Vec<u8>>,
}

impl ValidatorKeyPair {
    pub fn new(public_key: impl Into<String>, private_key: Vec<u8>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: Zeroizing::new(private_key),
        }
    }

    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    #[must_use]
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

impl fmt::Debug for ValidatorKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// One key share sealed to one operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedShare {
    pub operator_id: OperatorId,
    pub operator_key: String,
    /// 0x-prefixed hex
    pub share_public_key: String,
    /// Base64
    pub encrypted_key: String,
}

/// What the registration payload is bound to
pub struct Ownership<'a> {
    pub owner: &'a OwnerAddress,
    pub nonce: u64,
    pub private_key: &'a [u8],
}

/// Opens a keystore with the batch password
#[async_trait]
pub trait KeystoreDecryptor: Send + Sync {
    async fn decrypt(&self, keystore: &Keystore, password: &str) -> anyhow::Result<ValidatorKeyPair>;
}

/// Turns a private key into operator shares and a registration payload
pub trait ShareBuilder: Send + Sync {
    /// One encrypted share per operator, in operator order
    fn build_shares(
        &self,
        private_key: &[u8],
        operators: &[Operator],
    ) -> anyhow::Result<Vec<EncryptedShare>>;

    fn build_payload(
        &self,
        public_key: &str,
        operators: &[Operator],
        shares: &[EncryptedShare],
        ownership: &Ownership<'_>,
    ) -> anyhow::Result<KeySharePayload>;
}

/// Per-share cryptography used by [`ThresholdShareBuilder`](super::ThresholdShareBuilder)
pub trait ShareCipher: Send + Sync {
    /// Seals share bytes to the operator's public key
    fn encrypt(&self, operator: &Operator, share: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Public key corresponding to a share
    fn share_public_key(&self, share: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Signature over `owner:nonce` with the validator key
    fn sign_ownership(
        &self,
        private_key: &[u8],
        owner: &OwnerAddress,
        nonce: u64,
    ) -> anyhow::Result<Vec<u8>>;
}

/// Durable storage for finished bundles
#[async_trait]
pub trait ShareStore: Send + Sync {
    /// Writes one bundle and returns where it landed
    async fn persist(&self, bundle: &KeyShares) -> anyhow::Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keystore() {
        let keystore = Keystore::parse(
            r#"{
                "crypto": {"kdf": {"function": "scrypt"}, "cipher": {}, "checksum": {}},
                "description": "",
                "pubkey": "8f3c",
                "path": "m/12381/3600/0/0/0",
                "uuid": "1d85ae20-35c5-4611-98e8-aa14a633906f",
                "version": 4
            }"#,
        )
        .unwrap();
        assert_eq!(keystore.version, 4);
        assert_eq!(keystore.crypto["kdf"]["function"], "scrypt");
    }

    #[test]
    fn test_key_pair_debug_hides_private_key() {
        let keys = ValidatorKeyPair::new("0xabc", vec![7; 32]);
        let printed = format!("{keys:?}");
        assert!(printed.contains("0xabc"));
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("7, 7"));
    }
}
