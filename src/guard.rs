//! Expiration guard for the operator snapshot
//!
//! A background task compares the clock against the snapshot's `expires_at` on a
//! fixed interval and raises a flag once the snapshot is stale. The flag is for
//! observers such as a long-running front end; the session itself compares the
//! clock before starting a selection or a batch, and a running pipeline is never
//! interrupted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::directory::OperatorCacheMeta;

/// Periodic expiry check
pub struct ExpirationGuard;

impl ExpirationGuard {
    /// Whether `meta` describes a snapshot that has expired at `now`
    ///
    /// No snapshot means nothing to expire.
    #[must_use]
    pub fn check(meta: Option<&OperatorCacheMeta>, now: DateTime<Utc>) -> bool {
        meta.is_some_and(|meta| meta.is_expired(now))
    }

    /// Starts the guard on the current runtime
    ///
    /// A new value on `meta` (a re-sync) is picked up immediately and clears the flag.
    pub fn spawn(
        mut meta: watch::Receiver<Option<OperatorCacheMeta>>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> GuardHandle {
        let (expired_tx, expired_rx) = watch::channel(false);

        info!(interval_secs = interval.as_secs(), "Starting expiration guard");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = meta.changed() => {
                        if changed.is_err() {
                            debug!("Snapshot sender dropped, stopping expiration guard");
                            break;
                        }
                    }
                }

                let expired = Self::check(meta.borrow_and_update().as_ref(), clock.now());
                let flipped = expired_tx.send_if_modified(|current| {
                    let modified = *current != expired;
                    *current = expired;
                    modified
                });
                if flipped && expired {
                    info!("Operator snapshot expired, synchronization required");
                }
                if expired_tx.is_closed() {
                    break;
                }
            }
        });

        GuardHandle {
            expired: expired_rx,
            task,
        }
    }
}

/// Owner side of a running guard; stops the task on drop
pub struct GuardHandle {
    expired: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl GuardHandle {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        *self.expired.borrow()
    }

    /// A receiver for callers that want to react to the flag
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.expired.clone()
    }

    /// Waits until the snapshot is flagged as expired
    pub async fn expired(&mut self) {
        // The sender only goes away with the task; nothing left to wait for then.
        let _ = self.expired.wait_for(|expired| *expired).await;
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
