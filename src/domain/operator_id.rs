//! `OperatorId` newtype

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an operator in the on-chain registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(u64);

impl OperatorId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl std::ops::Deref for OperatorId {
    type Target = u64;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for OperatorId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for OperatorId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
