//! Operator records as served by the operator directory
//!
//! The wire format is the directory's JSON (`is_active` as `0|1`, `mev_relays` as a
//! comma-separated string, empty strings for absent addresses). Serializing an
//! [`Operator`] produces the same shape, so snapshots written to disk parse back
//! through the same code path.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::{Network, OperatorId};

/// Fee unit conversion: yearly fee strings are divided by this to get SSV
pub const SSV_EXCHANGE: f64 = 382_640_000_000.0;

/// Directory `type` value of a verified operator
pub const VERIFIED_OPERATOR: &str = "verified_operator";

/// Directory `type` value written back for operators that are not verified
const UNVERIFIED_OPERATOR: &str = "operator";

/// Whether the directory has verified an operator's identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verification {
    Verified,
    #[default]
    Unverified,
}

impl From<String> for Verification {
    fn from(value: String) -> Self {
        if value == VERIFIED_OPERATOR {
            Verification::Verified
        } else {
            Verification::Unverified
        }
    }
}

impl From<Verification> for String {
    fn from(value: Verification) -> Self {
        match value {
            Verification::Verified => VERIFIED_OPERATOR.to_string(),
            Verification::Unverified => UNVERIFIED_OPERATOR.to_string(),
        }
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Verified => f.write_str("verified"),
            Verification::Unverified => f.write_str("unverified"),
        }
    }
}

/// One operator from the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    #[serde(default)]
    pub name: String,
    /// Yearly fee as a fixed-point integer string
    #[serde(default, deserialize_with = "fee_string")]
    pub fee: String,
    #[serde(default)]
    pub validators_count: u64,
    #[serde(default, with = "activity_flag")]
    pub is_active: bool,
    #[serde(rename = "type", default)]
    pub verification: Verification,
    #[serde(default, with = "relay_list")]
    pub mev_relays: Vec<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub dkg_address: Option<String>,
    /// Present only for private operators
    #[serde(default, deserialize_with = "non_empty")]
    pub address_whitelist: Option<String>,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub logo: String,
    /// Operator encryption key shares are sealed to
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub status: String,
}

impl Operator {
    /// Creates an active, unverified operator with no load
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: OperatorId::new(id),
            name: name.into(),
            fee: "0".to_string(),
            validators_count: 0,
            is_active: true,
            verification: Verification::Unverified,
            mev_relays: Vec::new(),
            dkg_address: None,
            address_whitelist: None,
            network: String::new(),
            logo: String::new(),
            public_key: String::new(),
            status: String::new(),
        }
    }

    /// Operators with a whitelist only accept validators from listed owners
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.address_whitelist.is_some()
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verification == Verification::Verified
    }

    #[must_use]
    pub fn has_dkg(&self) -> bool {
        self.dkg_address.is_some()
    }

    /// Inactive operators that still run validators must not receive new ones
    #[must_use]
    pub fn is_inactive_with_load(&self) -> bool {
        !self.is_active && self.validators_count > 0
    }

    /// Whether adding `pending_keys` validators would reach the network ceiling
    #[must_use]
    pub fn is_at_capacity(&self, network: Network, pending_keys: u64) -> bool {
        self.validators_count.saturating_add(pending_keys) >= network.capacity_ceiling()
    }

    /// Whether the operator belongs to the given provider group
    #[must_use]
    pub fn matches_provider(&self, provider: &str) -> bool {
        !provider.is_empty() && self.name.contains(provider)
    }

    /// Yearly fee in SSV, rounded to two decimals
    ///
    /// ```rust
    /// use keysplit::domain::Operator;
    ///
    /// let mut operator = Operator::new(1, "Example");
    /// operator.fee = "956600000000".to_string();
    /// assert_eq!(operator.yearly_fee_ssv(), 2.5);
    /// ```
    #[must_use]
    pub fn yearly_fee_ssv(&self) -> f64 {
        let fee: f64 = self.fee.trim().parse().unwrap_or(0.0);
        round_cents(fee / SSV_EXCHANGE)
    }
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Accepts the fee as either a JSON string or a number
fn fee_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Fee {
        Text(String),
        Integer(u64),
        Float(f64),
    }

    Ok(match Option::<Fee>::deserialize(deserializer)? {
        Some(Fee::Text(s)) => s,
        Some(Fee::Integer(n)) => n.to_string(),
        Some(Fee::Float(n)) => format!("{n:.0}"),
        None => "0".to_string(),
    })
}

/// Treats `null` and empty strings as absent
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

mod activity_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(active: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*active))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Bool(bool),
            Int(i64),
        }

        Ok(match Option::<Flag>::deserialize(deserializer)? {
            Some(Flag::Bool(b)) => b,
            Some(Flag::Int(n)) => n != 0,
            None => false,
        })
    }
}

mod relay_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(relays: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&relays.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|relay| !relay.is_empty())
            .map(str::to_string)
            .collect())
    }
}
