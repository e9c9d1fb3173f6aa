//! Domain types for operator clusters
//!
//! This module contains validated newtypes and the operator record:
//! - [`ClusterSize`] - Allowed cluster sizes (4, 7, 10, 13)
//! - [`OperatorId`] - Registry identifier of an operator
//! - [`Network`] - Supported Ethereum networks and their capacity ceilings
//! - [`OwnerAddress`] - Owner of the registered validators
//! - [`Operator`] - One entry of the operator directory

mod cluster_size;
mod network;
mod operator;
mod operator_id;
mod owner;

pub use cluster_size::ClusterSize;
pub use network::Network;
pub use operator::{Operator, SSV_EXCHANGE, VERIFIED_OPERATOR, Verification};
pub(crate) use operator::round_cents;
pub use operator_id::OperatorId;
pub use owner::OwnerAddress;
