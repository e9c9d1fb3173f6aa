//! `ClusterSize` newtype for operator clusters

use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Number of operators that jointly hold one validator key (4, 7, 10 or 13)
///
/// Every allowed size has the form `3f + 1`, so a cluster tolerates `f` faulty
/// operators and any `n - f` shares reconstruct the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ClusterSize(u8);

impl ClusterSize {
    /// Allowed cluster sizes, smallest first
    pub const ALLOWED: [u8; 4] = [4, 7, 10, 13];

    /// Creates a new cluster size
    ///
    /// # Errors
    /// Returns an error if `value` is not one of [`ClusterSize::ALLOWED`]
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keysplit::domain::ClusterSize;
    ///
    /// let size = ClusterSize::new(7).unwrap();
    /// assert_eq!(*size, 7);
    ///
    /// assert!(ClusterSize::new(5).is_err());
    /// assert!(ClusterSize::new(0).is_err());
    /// ```
    pub fn new(value: u8) -> Result<Self> {
        if !Self::ALLOWED.contains(&value) {
            bail!("Cluster size must be one of 4, 7, 10 or 13 (got {value})");
        }
        Ok(Self(value))
    }

    /// All allowed sizes
    pub fn all() -> impl Iterator<Item = ClusterSize> {
        Self::ALLOWED.into_iter().map(ClusterSize)
    }

    /// Number of faulty operators the cluster tolerates
    #[must_use]
    pub fn fault_tolerance(&self) -> u8 {
        (self.0 - 1) / 3
    }

    /// Minimum number of shares needed to reconstruct the key
    ///
    /// ```rust
    /// use keysplit::domain::ClusterSize;
    ///
    /// assert_eq!(ClusterSize::default().threshold(), 3);
    /// assert_eq!(ClusterSize::new(13).unwrap().threshold(), 9);
    /// ```
    #[must_use]
    pub fn threshold(&self) -> u8 {
        self.0 - self.fault_tolerance()
    }
}

impl TryFrom<u8> for ClusterSize {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ClusterSize> for u8 {
    fn from(size: ClusterSize) -> Self {
        size.0
    }
}

impl Default for ClusterSize {
    fn default() -> Self {
        Self(4)
    }
}

impl std::ops::Deref for ClusterSize {
    type Target = u8;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ClusterSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
