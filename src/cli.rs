use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{ClusterSize, Network, OperatorId};

fn parse_network(s: &str) -> Result<Network, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

/// Only 4, 7, 10 and 13 operator clusters can be registered
fn parse_cluster_size(s: &str) -> Result<ClusterSize, String> {
    let value: u8 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    ClusterSize::new(value).map_err(|e| e.to_string())
}

fn parse_operator_id(s: &str) -> Result<OperatorId, String> {
    s.trim()
        .parse::<u64>()
        .map(OperatorId::new)
        .map_err(|_| format!("'{s}' is not a valid operator id"))
}

#[derive(Parser)]
#[command(name = "keysplit")]
#[command(about = "Pick SSV operator clusters and track registration nonces for key share batches")]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, env = "KEYSPLIT_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Directory for synchronized snapshots and cluster files
    #[arg(long, env = "KEYSPLIT_STATE_DIR", default_value = ".keysplit")]
    pub state_dir: PathBuf,

    /// Network to work on (mainnet, holesky, hoodi)
    #[arg(short, long, value_parser = parse_network, default_value = "mainnet")]
    pub network: Network,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the operator directory and the owner's registration nonce
    Sync,
    /// List operators from the synchronized snapshot
    Operators {
        /// Name or id fragment
        #[arg(short, long, default_value = "")]
        search: String,

        /// Only verified operators
        #[arg(long)]
        verified: bool,

        /// Only operators with a DKG endpoint
        #[arg(long)]
        dkg: bool,
    },
    /// Check a cluster for a batch of keys and save it
    Select {
        /// Cluster size (4, 7, 10 or 13)
        #[arg(short, long, value_parser = parse_cluster_size, default_value = "4")]
        size: ClusterSize,

        /// Number of keys the cluster will receive
        #[arg(short, long, default_value_t = 1)]
        keys: u64,

        /// Operator ids, comma separated; the mandatory operator is added if missing
        #[arg(required = true, value_delimiter = ',', value_parser = parse_operator_id)]
        operators: Vec<OperatorId>,
    },
    /// Show snapshot freshness and the current nonce
    Status,
}
