use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, warn};

use crate::directory::OperatorSource;
use crate::domain::{ClusterSize, Network, Operator, OperatorId};
use crate::nonce::NonceScanner;
use crate::selection::{OperatorFilter, SelectionOutcome};
use crate::session::{SavedSession, Session, SessionError};

/// Where the synchronized snapshot of a network is kept
#[must_use]
pub fn state_path(state_dir: &Path, network: Network) -> PathBuf {
    state_dir.join(format!("session-{network}.json"))
}

/// Where the last accepted cluster of a network is kept
#[must_use]
pub fn cluster_path(state_dir: &Path, network: Network) -> PathBuf {
    state_dir.join(format!("cluster-{network}.json"))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Reads a saved session, if one exists
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed
pub fn load_state(path: &Path) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file {}", path.display()))?;
    let saved = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse session file {}", path.display()))?;
    Ok(Some(saved))
}

fn user_error(e: SessionError) -> anyhow::Error {
    warn!(error = %e, "Command failed");
    anyhow!(e.user_message())
}

/// Synchronizes the session and saves it to the state directory
///
/// # Errors
/// Returns an error if the directory or nonce lookup fails, or the state cannot be written
pub async fn sync<S, N>(session: &mut Session<S, N>, state_dir: &Path) -> Result<String>
where
    S: OperatorSource,
    N: NonceScanner,
{
    let count = session.synchronize().await.map_err(user_error)?;
    let saved = session
        .save()
        .ok_or_else(|| anyhow!("Session is not usable after synchronization"))?;
    write_json(&state_path(state_dir, session.network()), &saved)?;

    Ok(format!(
        "Synchronized {count} operators on {}; nonce {}; valid until {}",
        session.network(),
        saved.nonce.current(),
        saved.meta.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    ))
}

/// Loads the saved session of the session's network, if any
///
/// # Errors
/// Returns an error if a saved session exists but cannot be read
pub fn resume<S, N>(session: &mut Session<S, N>, state_dir: &Path) -> Result<bool>
where
    S: OperatorSource,
    N: NonceScanner,
{
    let path = state_path(state_dir, session.network());
    match load_state(&path)? {
        Some(saved) => {
            debug!(path = %path.display(), "Resuming saved session");
            session.restore(saved);
            Ok(true)
        }
        None => Ok(false),
    }
}

fn flags(operator: &Operator, mandatory: OperatorId) -> String {
    let mut flags = vec![operator.verification.to_string()];
    if operator.id == mandatory {
        flags.push("mandatory".into());
    }
    if operator.has_dkg() {
        flags.push("dkg".into());
    }
    if operator.is_private() {
        flags.push("private".into());
    }
    if !operator.is_active {
        flags.push("inactive".into());
    }
    flags.join(",")
}

fn operator_row(out: &mut String, operator: &Operator, mandatory: OperatorId) {
    let _ = writeln!(
        out,
        "{:>6}  {:<32}  {:>8.2} SSV  {:>4}  {}",
        operator.id,
        operator.name,
        operator.yearly_fee_ssv(),
        operator.validators_count,
        flags(operator, mandatory)
    );
}

/// Filtered operator listing, provider operators first
///
/// # Errors
/// Returns an error if the session is not synchronized or has expired
pub fn list_operators<S, N>(session: &mut Session<S, N>, filter: &OperatorFilter) -> Result<String>
where
    S: OperatorSource,
    N: NonceScanner,
{
    let engine = session.begin_selection(1).map_err(user_error)?;
    let mandatory = engine.selection().mandatory();
    let shown = engine.filter(filter);

    let mut out = String::new();
    for operator in &shown {
        operator_row(&mut out, operator, mandatory);
    }
    let _ = write!(out, "{} of {} operators", shown.len(), engine.operators().len());
    Ok(out)
}

/// Validates a cluster for `keys` keys and saves it next to the session
///
/// The mandatory operator is added to `ids` when missing.
///
/// # Errors
/// Returns an error if the session is stale, the selection is rejected or incomplete,
/// or the cluster cannot be written
pub fn select<S, N>(
    session: &mut Session<S, N>,
    state_dir: &Path,
    size: ClusterSize,
    keys: u64,
    ids: &[OperatorId],
) -> Result<String>
where
    S: OperatorSource,
    N: NonceScanner,
{
    let network = session.network();
    let nonce = session.nonce();
    let engine = session.begin_selection(keys).map_err(user_error)?;
    engine.set_target_size(size);

    let mut requested = ids.to_vec();
    requested.push(engine.selection().mandatory());
    if let SelectionOutcome::Rejected(reason) = engine.toggle_selection(requested) {
        bail!("Selection rejected: {reason}");
    }

    let selection = engine.selection().clone();
    let snapshot = engine.clone().into_snapshot()?;
    write_json(&cluster_path(state_dir, network), &snapshot)?;

    let mut out = String::new();
    for operator in selection.ordered() {
        operator_row(&mut out, operator, selection.mandatory());
    }
    let _ = writeln!(out, "Yearly fee: {:.2} SSV", selection.total_yearly_fee());
    if selection.has_unverified() {
        let _ = writeln!(out, "Warning: cluster contains unverified operators");
    }
    if selection.at_capacity(network, keys) {
        let _ = writeln!(out, "Warning: an operator reached its maximum amount of validators");
    }
    if let Some(nonce) = nonce {
        let _ = write!(
            out,
            "{keys} key(s) will use nonces {nonce}..{}",
            nonce.saturating_add(keys).saturating_sub(1)
        );
    }
    let _ = write!(
        out,
        "\nCluster saved to {}; key shares are generated through the keysplit library",
        cluster_path(state_dir, network).display()
    );
    Ok(out)
}

/// Snapshot freshness and nonce
#[must_use]
pub fn status<S, N>(session: &Session<S, N>) -> String
where
    S: OperatorSource,
    N: NonceScanner,
{
    let network = session.network();
    match (session.meta(), session.nonce()) {
        (Some(meta), Some(nonce)) if session.is_fresh() => format!(
            "{network}: synchronized, nonce {nonce}, valid until {}",
            meta.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        (Some(meta), _) => format!(
            "{network}: expired at {}, run sync",
            meta.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        (None, _) => format!("{network}: not synchronized, run sync"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::NetworkConfig;
    use crate::directory::{DirectoryError, DirectoryQuery, OperatorCache};
    use crate::domain::{OwnerAddress, Verification};
    use crate::nonce::NonceRequest;
    use crate::selection::ClusterSnapshot;

    struct Directory;

    #[async_trait]
    impl OperatorSource for Directory {
        async fn fetch_operators(&self, _query: &DirectoryQuery) -> Result<Vec<Operator>, DirectoryError> {
            let mut operators: Vec<Operator> = (1..=8)
                .map(|id| {
                    let mut op = Operator::new(id, format!("Operator {id}"));
                    op.fee = "382640000000".into();
                    op.verification = Verification::Verified;
                    op
                })
                .collect();
            operators[4].name = "DxPool Main".into();
            operators[6].address_whitelist = Some("0xfriend".into());
            Ok(operators)
        }

        async fn fetch_logo(&self, _url: &str) -> Result<String, DirectoryError> {
            Ok(String::new())
        }
    }

    struct Scanner;

    #[async_trait]
    impl NonceScanner for Scanner {
        async fn scan(&self, _request: &NonceRequest) -> Result<u64, DirectoryError> {
            Ok(21)
        }
    }

    fn new_session(clock: Arc<ManualClock>) -> Session<Directory, Scanner> {
        let config = NetworkConfig {
            node_url: String::new(),
            network: Network::Hoodi,
            owner_address: OwnerAddress::new("0xowner"),
            default_operator: Vec::new(),
        };
        Session::new(OperatorCache::new(Directory, clock), Scanner, config, "DxPool")
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn test_sync_then_resume_in_new_process() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();

        let mut first = new_session(clock.clone());
        let summary = sync(&mut first, dir.path()).await.unwrap();
        assert!(summary.contains("Synchronized 8 operators on hoodi; nonce 21"));
        assert!(state_path(dir.path(), Network::Hoodi).exists());

        let mut second = new_session(clock.clone());
        assert!(status(&second).contains("not synchronized"));
        assert!(resume(&mut second, dir.path()).unwrap());
        assert!(status(&second).starts_with("hoodi: synchronized, nonce 21"));

        clock.advance(chrono::Duration::hours(1));
        assert!(status(&second).contains("expired"));
    }

    #[tokio::test]
    async fn test_list_puts_provider_first() {
        let mut session = new_session(clock());
        session.synchronize().await.unwrap();

        let listing = list_operators(&mut session, &OperatorFilter::default()).unwrap();
        let first = listing.lines().next().unwrap();
        assert!(first.contains("DxPool Main"));
        assert!(first.contains("mandatory"));
        assert!(listing.ends_with("8 of 8 operators"));
    }

    #[tokio::test]
    async fn test_select_adds_mandatory_and_saves_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = new_session(clock());
        session.synchronize().await.unwrap();

        let ids = [1, 2, 3].map(OperatorId::new);
        let summary = select(&mut session, dir.path(), ClusterSize::default(), 3, &ids).unwrap();

        assert!(summary.lines().next().unwrap().contains("DxPool Main"));
        assert!(summary.contains("Yearly fee: 4.00 SSV"));
        assert!(summary.contains("3 key(s) will use nonces 21..23"));
        assert!(!summary.contains("Warning"));
        assert!(summary.ends_with("key shares are generated through the keysplit library"));

        let raw = std::fs::read_to_string(cluster_path(dir.path(), Network::Hoodi)).unwrap();
        let saved: ClusterSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved.ids(), [1, 2, 3, 5].map(OperatorId::new).to_vec());
    }

    #[tokio::test]
    async fn test_select_reports_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = new_session(clock());
        session.synchronize().await.unwrap();

        let err = select(&mut session, dir.path(), ClusterSize::default(), 1, &[OperatorId::new(7)])
            .unwrap_err();
        assert!(err.to_string().contains("operator 7 is private"));

        let err = select(&mut session, dir.path(), ClusterSize::default(), 1, &[OperatorId::new(1)])
            .unwrap_err();
        assert!(err.to_string().contains("Cluster incomplete: 2 of 4"));
    }

    #[test]
    fn test_commands_need_sync() {
        let mut session = new_session(clock());
        let err = list_operators(&mut session, &OperatorFilter::default()).unwrap_err();
        assert_eq!(err.to_string(), "Not synchronized with the operator directory");
    }
}
