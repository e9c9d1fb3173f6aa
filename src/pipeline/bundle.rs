//! Key-share bundle file format
//!
//! Matches the `keyshares.json` layout registration tooling consumes:
//!
//! ```json
//! {
//!   "version": "v1.1.0",
//!   "createdAt": "2026-01-01T12:00:00.000Z",
//!   "shares": [{
//!     "data": { "ownerNonce": 10, "ownerAddress": "0x..", "publicKey": "0x..",
//!               "operators": [{ "id": 1, "operatorKey": "LS0t.." }] },
//!     "payload": { "publicKey": "0x..", "operatorIds": [1, 2, 3, 4], "sharesData": "0x.." }
//!   }]
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::collaborators::EncryptedShare;
use crate::domain::{OperatorId, OwnerAddress};

pub const KEYSHARES_VERSION: &str = "v1.1.0";

/// On-chain registration payload for one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySharePayload {
    pub public_key: String,
    pub operator_ids: Vec<OperatorId>,
    /// Ownership signature, share public keys and encrypted keys, hex-concatenated
    pub shares_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorKey {
    pub id: OperatorId,
    pub operator_key: String,
}

/// What the payload was built for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySharesData {
    pub owner_nonce: u64,
    pub owner_address: OwnerAddress,
    pub public_key: String,
    pub operators: Vec<OperatorKey>,
}

impl KeySharesData {
    pub fn new(owner: &OwnerAddress, nonce: u64, public_key: &str, shares: &[EncryptedShare]) -> Self {
        Self {
            owner_nonce: nonce,
            owner_address: owner.clone(),
            public_key: public_key.to_string(),
            operators: shares
                .iter()
                .map(|share| OperatorKey {
                    id: share.operator_id,
                    operator_key: share.operator_key.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySharesItem {
    pub data: KeySharesData,
    pub payload: KeySharePayload,
}

/// One persisted bundle; the pipeline writes one item per file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyShares {
    pub version: String,
    pub created_at: String,
    pub shares: Vec<KeySharesItem>,
}

impl KeyShares {
    pub fn new(item: KeySharesItem, created_at: DateTime<Utc>) -> Self {
        Self {
            version: KEYSHARES_VERSION.to_string(),
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            shares: vec![item],
        }
    }

    /// Nonce of the first item
    #[must_use]
    pub fn owner_nonce(&self) -> Option<u64> {
        self.shares.first().map(|item| item.data.owner_nonce)
    }

    /// Pretty JSON as written to disk
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_bundle_layout() {
        let shares = vec![EncryptedShare {
            operator_id: OperatorId::new(3),
            operator_key: "LS0tkey3".into(),
            share_public_key: "0xaa".into(),
            encrypted_key: "AQID".into(),
        }];
        let item = KeySharesItem {
            data: KeySharesData::new(&OwnerAddress::new("0xowner"), 12, "0xpub", &shares),
            payload: KeySharePayload {
                public_key: "0xpub".into(),
                operator_ids: vec![OperatorId::new(3)],
                shares_data: "0x00".into(),
            },
        };
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let bundle = KeyShares::new(item, created);

        let value: serde_json::Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(value["version"], KEYSHARES_VERSION);
        assert_eq!(value["createdAt"], "2026-01-01T12:00:00.000Z");
        assert_eq!(value["shares"][0]["data"]["ownerNonce"], 12);
        assert_eq!(value["shares"][0]["data"]["operators"][0]["operatorKey"], "LS0tkey3");
        assert_eq!(value["shares"][0]["payload"]["operatorIds"][0], 3);
        assert_eq!(bundle.owner_nonce(), Some(12));
    }
}
