//! Ethereum networks supported by the operator directory

use std::fmt;
use std::str::FromStr;

use anyhow::{Error, bail};
use serde::{Deserialize, Serialize};

/// Network an operator snapshot and a nonce belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Holesky,
    Hoodi,
}

impl Network {
    /// Lower-case name used by the directory service and the config file
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Holesky => "holesky",
            Network::Hoodi => "hoodi",
        }
    }

    /// Validator count at which an operator stops accepting new validators
    ///
    /// An operator is full once `validators_count + pending_keys` reaches this value.
    #[must_use]
    pub fn capacity_ceiling(&self) -> u64 {
        match self {
            Network::Mainnet => 500,
            Network::Holesky | Network::Hoodi => 560,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "holesky" => Ok(Network::Holesky),
            "hoodi" => Ok(Network::Hoodi),
            other => bail!("Unknown network '{other}' (expected mainnet, holesky or hoodi)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!(" HOODI ".parse::<Network>().unwrap(), Network::Hoodi);
        assert!("sepolia".parse::<Network>().is_err());
    }

    #[test]
    fn test_capacity_ceiling() {
        assert_eq!(Network::Mainnet.capacity_ceiling(), 500);
        assert_eq!(Network::Hoodi.capacity_ceiling(), 560);
    }
}
