//! Cluster selection engine
//!
//! A [`SelectionEngine`] owns one directory snapshot and the [`ClusterSelection`]
//! built from it. Every mutation is checked before it is applied, so the selection
//! is valid at all times:
//!
//! - the mandatory operator is always a member and cannot be removed
//! - the selection never exceeds its [`ClusterSize`]
//! - inactive operators that still carry validators are never members
//! - operators that would reach the network's capacity ceiling with the pending
//!   batch are never members
//! - private (whitelisted) operators are never added
//!
//! A mutation that would break a rule leaves the selection untouched and reports
//! [`SelectionOutcome::Rejected`]; it is not an error.
//!
//! # Examples
//!
//! ```rust
//! use keysplit::domain::{Network, Operator, OperatorId};
//! use keysplit::selection::SelectionEngine;
//!
//! let operators = vec![
//!     Operator::new(1, "DxPool 1"),
//!     Operator::new(2, "Alpha"),
//!     Operator::new(3, "Beta"),
//!     Operator::new(4, "Gamma"),
//!     Operator::new(5, "Delta"),
//! ];
//! let mut engine = SelectionEngine::new(Network::Mainnet, operators, "DxPool", 1).unwrap();
//! assert_eq!(engine.selection().len(), 1);
//!
//! let ids = [1, 2, 3, 4].map(OperatorId::new);
//! assert!(engine.toggle_selection(ids).is_applied());
//! assert!(engine.selection().is_complete());
//!
//! // Dropping the mandatory operator is refused
//! assert!(!engine.toggle_selection([2, 3, 4].map(OperatorId::new)).is_applied());
//! assert_eq!(engine.selection().len(), 4);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ClusterSize, Network, Operator, OperatorId, round_cents};

/// Why a mutation was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MandatoryMissing(OperatorId),
    MandatoryRemoval(OperatorId),
    TooManyOperators { requested: usize, target: ClusterSize },
    UnknownOperator(OperatorId),
    InactiveWithLoad(OperatorId),
    AtCapacity(OperatorId),
    PrivateOperator(OperatorId),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MandatoryMissing(id) => {
                write!(f, "operator {id} is mandatory and must stay selected")
            }
            RejectReason::MandatoryRemoval(id) => {
                write!(f, "operator {id} is mandatory and cannot be removed")
            }
            RejectReason::TooManyOperators { requested, target } => {
                write!(f, "{requested} operators selected but the cluster size is {target}")
            }
            RejectReason::UnknownOperator(id) => write!(f, "operator {id} is not in the directory"),
            RejectReason::InactiveWithLoad(id) => {
                write!(f, "operator {id} is inactive but still runs validators")
            }
            RejectReason::AtCapacity(id) => {
                write!(f, "operator {id} reached its maximum amount of validators")
            }
            RejectReason::PrivateOperator(id) => write!(f, "operator {id} is private"),
        }
    }
}

/// Result of a selection mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Applied,
    /// The selection is unchanged
    Rejected(RejectReason),
}

impl SelectionOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, SelectionOutcome::Applied)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            SelectionOutcome::Applied => None,
            SelectionOutcome::Rejected(reason) => Some(reason),
        }
    }
}

/// Structural failures: no cluster can be built at all
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("No active public '{provider}' operator available on {network}")]
    NoMandatoryOperator { network: Network, provider: String },

    #[error("Cluster incomplete: {selected} of {target} operators selected")]
    Incomplete { selected: usize, target: ClusterSize },
}

/// Picks the always-included operator
///
/// The active, public operator of the provider group with the fewest validators;
/// ties go to the lowest id.
pub fn mandatory_operator<'a>(operators: &'a [Operator], provider: &str) -> Option<&'a Operator> {
    operators
        .iter()
        .filter(|op| op.matches_provider(provider) && op.is_active && !op.is_private())
        .min_by_key(|op| (op.validators_count, op.id))
}

/// Appends configured fallback operators the directory did not return
///
/// Returns how many were added.
pub fn merge_fallbacks(operators: &mut Vec<Operator>, fallbacks: &[Operator]) -> usize {
    let before = operators.len();
    for fallback in fallbacks {
        if !operators.iter().any(|op| op.id == fallback.id) {
            operators.push(fallback.clone());
        }
    }
    operators.len() - before
}

/// Operators currently chosen to hold shares of the next keys
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSelection {
    members: BTreeMap<OperatorId, Operator>,
    target: ClusterSize,
    mandatory: OperatorId,
}

impl ClusterSelection {
    fn seeded(mandatory: &Operator) -> Self {
        let mut members = BTreeMap::new();
        members.insert(mandatory.id, mandatory.clone());
        Self {
            members,
            target: ClusterSize::default(),
            mandatory: mandatory.id,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn target(&self) -> ClusterSize {
        self.target
    }

    #[must_use]
    pub fn mandatory(&self) -> OperatorId {
        self.mandatory
    }

    #[must_use]
    pub fn contains(&self, id: OperatorId) -> bool {
        self.members.contains_key(&id)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.members.len() == usize::from(*self.target)
    }

    /// Member ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = OperatorId> + '_ {
        self.members.keys().copied()
    }

    /// Members for display: mandatory first, then ascending id
    #[must_use]
    pub fn ordered(&self) -> Vec<&Operator> {
        let mut ordered: Vec<&Operator> = self.members.values().collect();
        ordered.sort_by_key(|op| (op.id != self.mandatory, op.id));
        ordered
    }

    /// Sum of the members' yearly fees in SSV
    #[must_use]
    pub fn total_yearly_fee(&self) -> f64 {
        round_cents(self.members.values().map(Operator::yearly_fee_ssv).sum())
    }

    #[must_use]
    pub fn has_unverified(&self) -> bool {
        self.members.values().any(|op| !op.is_verified())
    }

    /// Whether any member would hit the capacity ceiling with `pending_keys` more validators
    #[must_use]
    pub fn at_capacity(&self, network: Network, pending_keys: u64) -> bool {
        self.members
            .values()
            .any(|op| op.is_at_capacity(network, pending_keys))
    }
}

/// A complete, validated cluster handed to the key pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub network: Network,
    pub size: ClusterSize,
    /// Ascending by id
    pub operators: Vec<Operator>,
}

impl ClusterSnapshot {
    #[must_use]
    pub fn ids(&self) -> Vec<OperatorId> {
        self.operators.iter().map(|op| op.id).collect()
    }
}

/// Display filters over the directory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorFilter {
    /// Case-insensitive name substring, or id substring
    pub search: String,
    pub verified_only: bool,
    pub dkg_only: bool,
}

impl OperatorFilter {
    fn matches(&self, operator: &Operator) -> bool {
        if self.verified_only && !operator.is_verified() {
            return false;
        }
        if self.dkg_only && !operator.has_dkg() {
            return false;
        }
        let search = self.search.trim();
        if search.is_empty() {
            return true;
        }
        operator.name.to_lowercase().contains(&search.to_lowercase())
            || operator.id.to_string().contains(search)
    }
}

/// Holds a directory snapshot and the selection built from it
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    network: Network,
    provider: String,
    operators: Vec<Operator>,
    pending_keys: u64,
    selection: ClusterSelection,
}

impl SelectionEngine {
    /// Starts a selection for a batch of `pending_keys` keys, seeded with the mandatory operator
    ///
    /// # Errors
    /// Returns an error if no operator qualifies as mandatory
    pub fn new(
        network: Network,
        operators: Vec<Operator>,
        provider: &str,
        pending_keys: u64,
    ) -> Result<Self, SelectionError> {
        let mandatory = mandatory_operator(&operators, provider).ok_or_else(|| {
            SelectionError::NoMandatoryOperator {
                network,
                provider: provider.to_string(),
            }
        })?;
        let selection = ClusterSelection::seeded(mandatory);
        debug!(%network, mandatory = %selection.mandatory, "Selection started");

        Ok(Self {
            network,
            provider: provider.to_string(),
            operators,
            pending_keys,
            selection,
        })
    }

    #[must_use]
    pub fn selection(&self) -> &ClusterSelection {
        &self.selection
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    #[must_use]
    pub fn pending_keys(&self) -> u64 {
        self.pending_keys
    }

    #[must_use]
    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    fn find(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.iter().find(|op| op.id == id)
    }

    /// Whether an operator could join the cluster at all
    ///
    /// # Errors
    /// Returns the rule the operator breaks
    pub fn check_eligible(&self, operator: &Operator) -> Result<(), RejectReason> {
        if operator.is_inactive_with_load() {
            return Err(RejectReason::InactiveWithLoad(operator.id));
        }
        if operator.is_at_capacity(self.network, self.pending_keys) {
            return Err(RejectReason::AtCapacity(operator.id));
        }
        if operator.is_private() && operator.id != self.selection.mandatory {
            return Err(RejectReason::PrivateOperator(operator.id));
        }
        Ok(())
    }

    /// Changes the cluster size
    ///
    /// Shrinking drops non-mandatory members, highest id first, until the new size fits.
    pub fn set_target_size(&mut self, size: ClusterSize) -> SelectionOutcome {
        let target = usize::from(*size);
        let mandatory = self.selection.mandatory;
        let excess: Vec<OperatorId> = self
            .selection
            .members
            .keys()
            .rev()
            .copied()
            .filter(|id| *id != mandatory)
            .take(self.selection.len().saturating_sub(target))
            .collect();

        for id in &excess {
            self.selection.members.remove(id);
        }
        self.selection.target = size;
        debug!(size = %size, dropped = excess.len(), "Cluster size changed");
        SelectionOutcome::Applied
    }

    /// Replaces the selection with `candidates` if every rule holds
    pub fn toggle_selection<I>(&mut self, candidates: I) -> SelectionOutcome
    where
        I: IntoIterator<Item = OperatorId>,
    {
        let requested: BTreeSet<OperatorId> = candidates.into_iter().collect();
        match self.validate(&requested) {
            Ok(members) => {
                self.selection.members = members;
                SelectionOutcome::Applied
            }
            Err(reason) => {
                debug!(%reason, "Selection change rejected");
                SelectionOutcome::Rejected(reason)
            }
        }
    }

    fn validate(
        &self,
        requested: &BTreeSet<OperatorId>,
    ) -> Result<BTreeMap<OperatorId, Operator>, RejectReason> {
        let mandatory = self.selection.mandatory;
        if !requested.contains(&mandatory) {
            return Err(RejectReason::MandatoryMissing(mandatory));
        }

        let target = self.selection.target;
        if requested.len() > usize::from(*target) {
            return Err(RejectReason::TooManyOperators {
                requested: requested.len(),
                target,
            });
        }

        let mut members = BTreeMap::new();
        for id in requested {
            let operator = self
                .find(*id)
                .ok_or(RejectReason::UnknownOperator(*id))?;
            self.check_eligible(operator)?;
            members.insert(*id, operator.clone());
        }
        Ok(members)
    }

    /// Removes one member; the mandatory operator is refused
    pub fn remove(&mut self, id: OperatorId) -> SelectionOutcome {
        if id == self.selection.mandatory {
            return SelectionOutcome::Rejected(RejectReason::MandatoryRemoval(id));
        }
        self.selection.members.remove(&id);
        SelectionOutcome::Applied
    }

    /// Operators to display; the provider group comes first, otherwise directory order
    ///
    /// Never changes the selection.
    #[must_use]
    pub fn filter(&self, filter: &OperatorFilter) -> Vec<&Operator> {
        let mut shown: Vec<&Operator> = self
            .operators
            .iter()
            .filter(|op| filter.matches(op))
            .collect();
        shown.sort_by_key(|op| !op.matches_provider(&self.provider));
        shown
    }

    /// Members that would currently break a rule
    ///
    /// Accepted selections are validated against the same rules, so this is only
    /// non-empty when the mandatory operator itself breaks one, e.g. a provider
    /// operator at capacity. Such a selection cannot grow past its mandatory member.
    #[must_use]
    pub fn violations(&self) -> Vec<RejectReason> {
        self.selection
            .members
            .values()
            .filter_map(|op| self.check_eligible(op).err())
            .collect()
    }

    /// Hands over a complete, valid selection
    ///
    /// # Errors
    /// Returns an error if the selection is smaller than its target
    pub fn into_snapshot(self) -> Result<ClusterSnapshot, SelectionError> {
        if !self.selection.is_complete() {
            return Err(SelectionError::Incomplete {
                selected: self.selection.len(),
                target: self.selection.target,
            });
        }

        Ok(ClusterSnapshot {
            network: self.network,
            size: self.selection.target,
            operators: self.selection.members.into_values().collect(),
        })
    }
}
