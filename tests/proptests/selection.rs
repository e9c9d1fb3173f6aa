//! Property tests for the cluster selection engine

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

use keysplit::domain::{ClusterSize, Network, Operator, OperatorId};
use keysplit::selection::{OperatorFilter, SelectionEngine, SelectionOutcome};

const PROVIDER: &str = "DxPool";

/// A directory with at least one eligible provider operator
#[derive(Clone, Debug)]
struct Directory(Vec<Operator>);

impl Arbitrary for Directory {
    fn arbitrary(g: &mut Gen) -> Self {
        let count = u64::from(u8::arbitrary(g) % 30) + 5;
        let mut operators: Vec<Operator> = (1..=count)
            .map(|id| {
                let name = if u8::arbitrary(g) % 5 == 0 {
                    format!("{PROVIDER} {id}")
                } else {
                    format!("Operator {id}")
                };
                let mut op = Operator::new(id, name);
                op.validators_count = u64::from(u16::arbitrary(g) % 600);
                op.is_active = u8::arbitrary(g) % 4 != 0;
                if u8::arbitrary(g) % 6 == 0 {
                    op.address_whitelist = Some("0xfriend".into());
                }
                op
            })
            .collect();

        let anchor = usize::arbitrary(g) % operators.len();
        let op = &mut operators[anchor];
        op.name = format!("{PROVIDER} anchor");
        op.is_active = true;
        op.address_whitelist = None;
        op.validators_count = u64::from(u8::arbitrary(g) % 50);

        Directory(operators)
    }
}

#[derive(Clone, Debug)]
enum Action {
    Resize(ClusterSize),
    Toggle(Vec<u64>),
    Remove(u64),
    Filter(String),
}

impl Arbitrary for Action {
    fn arbitrary(g: &mut Gen) -> Self {
        match u8::arbitrary(g) % 4 {
            0 => {
                let sizes: Vec<ClusterSize> = ClusterSize::all().collect();
                Action::Resize(*g.choose(&sizes).unwrap_or(&ClusterSize::default()))
            }
            1 => {
                let len = usize::arbitrary(g) % 15;
                Action::Toggle((0..len).map(|_| u64::from(u8::arbitrary(g) % 40)).collect())
            }
            2 => Action::Remove(u64::from(u8::arbitrary(g) % 40)),
            _ => Action::Filter(String::arbitrary(g)),
        }
    }
}

fn assert_valid(engine: &SelectionEngine) -> bool {
    let selection = engine.selection();
    let mandatory = selection.mandatory();
    let members = selection.ordered();

    selection.len() <= usize::from(*selection.target())
        && selection.contains(mandatory)
        && members.iter().all(|op| !op.is_inactive_with_load())
        && members
            .iter()
            .filter(|op| op.id != mandatory)
            .all(|op| !op.is_private() && !op.is_at_capacity(engine.network(), engine.pending_keys()))
}

#[quickcheck]
fn prop_selection_stays_valid(directory: Directory, actions: Vec<Action>, pending: u8) -> bool {
    let pending = u64::from(pending % 80) + 1;
    let Ok(mut engine) = SelectionEngine::new(Network::Mainnet, directory.0, PROVIDER, pending) else {
        return false;
    };

    for action in actions {
        let before = engine.selection().clone();
        let outcome = match action {
            Action::Resize(size) => engine.set_target_size(size),
            Action::Toggle(ids) => engine.toggle_selection(ids.into_iter().map(OperatorId::new)),
            Action::Remove(id) => engine.remove(OperatorId::new(id)),
            Action::Filter(search) => {
                let _ = engine.filter(&OperatorFilter {
                    search,
                    ..Default::default()
                });
                SelectionOutcome::Applied
            }
        };

        if !outcome.is_applied() && engine.selection() != &before {
            return false;
        }
        if !assert_valid(&engine) {
            return false;
        }
    }
    true
}

#[quickcheck]
fn prop_toggle_without_mandatory_is_rejected(directory: Directory, picks: Vec<u8>) -> bool {
    let Ok(mut engine) = SelectionEngine::new(Network::Hoodi, directory.0, PROVIDER, 1) else {
        return false;
    };
    let mandatory = engine.selection().mandatory();
    let before = engine.selection().clone();

    let ids: Vec<OperatorId> = picks
        .into_iter()
        .map(|p| OperatorId::new(u64::from(p)))
        .filter(|id| *id != mandatory)
        .collect();

    !engine.toggle_selection(ids).is_applied() && engine.selection() == &before
}

#[quickcheck]
fn prop_filter_never_changes_selection(directory: Directory, search: String, verified: bool, dkg: bool) -> bool {
    let Ok(mut engine) = SelectionEngine::new(Network::Mainnet, directory.0, PROVIDER, 1) else {
        return false;
    };
    let candidates: Vec<OperatorId> = engine
        .operators()
        .iter()
        .filter(|op| engine.check_eligible(op).is_ok())
        .map(|op| op.id)
        .take(3)
        .collect();
    let mut pick = candidates;
    pick.push(engine.selection().mandatory());
    engine.toggle_selection(pick);
    let before = engine.selection().clone();

    let _ = engine.filter(&OperatorFilter::default());
    let shown = engine.filter(&OperatorFilter {
        search,
        verified_only: verified,
        dkg_only: dkg,
    });

    shown.len() <= engine.operators().len() && engine.selection() == &before
}

#[quickcheck]
fn prop_shrink_keeps_lowest_ids(directory: Directory) -> bool {
    let Ok(mut engine) = SelectionEngine::new(Network::Hoodi, directory.0, PROVIDER, 1) else {
        return false;
    };
    let mandatory = engine.selection().mandatory();
    engine.set_target_size(ClusterSize::new(13).unwrap_or_default());

    let mut eligible: Vec<OperatorId> = engine
        .operators()
        .iter()
        .filter(|op| op.id != mandatory && engine.check_eligible(op).is_ok())
        .map(|op| op.id)
        .take(12)
        .collect();
    eligible.push(mandatory);
    if !engine.toggle_selection(eligible.clone()).is_applied() {
        return false;
    }

    engine.set_target_size(ClusterSize::default());

    let mut others: Vec<OperatorId> = eligible.into_iter().filter(|id| *id != mandatory).collect();
    others.sort();
    let expected: Vec<OperatorId> = others.into_iter().take(3).collect();
    let kept: Vec<OperatorId> = engine.selection().ids().filter(|id| *id != mandatory).collect();

    kept == expected && engine.selection().contains(mandatory)
}
