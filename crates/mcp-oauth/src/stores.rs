//! Store bundle and periodic expiry sweep
//!
//! Expired records are also removed lazily when touched; the sweep bounds
//! memory from flows that are abandoned and never touched again. The sweep
//! task is owned by a [`SweepTask`] handle and stops when the handle is shut
//! down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::grants::GrantStore;
use crate::pending::PendingRequestStore;
use crate::tokens::AccessTokenStore;
use crate::types::now_millis;

/// The three in-memory stores of the authorization server.
#[derive(Clone)]
pub struct AuthStores {
    pub grants: Arc<GrantStore>,
    pub tokens: Arc<AccessTokenStore>,
    pub pending: Arc<PendingRequestStore>,
}

impl AuthStores {
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let tokens = Arc::new(AccessTokenStore::new(access_ttl, refresh_ttl));
        Self {
            grants: Arc::new(GrantStore::new(tokens.clone())),
            tokens,
            pending: Arc::new(PendingRequestStore::new()),
        }
    }
}

/// Counts of records removed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub grants: usize,
    pub pending: usize,
    pub tokens: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.grants + self.pending + self.tokens
    }
}

/// Run one sweep: remove everything that expired at or before `now`.
pub async fn sweep_once(stores: &AuthStores, now: u64) -> SweepReport {
    SweepReport {
        grants: stores.grants.sweep_expired(now).await,
        pending: stores.pending.sweep_expired(now).await,
        tokens: stores.tokens.sweep_expired(now).await,
    }
}

/// Handle to the background sweep task.
pub struct SweepTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl SweepTask {
    /// Spawn a task that sweeps `stores` every `interval`.
    pub fn spawn(stores: AuthStores, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; stores start empty
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = sweep_once(&stores, now_millis()).await;
                        if report.total() > 0 {
                            info!(
                                grants = report.grants,
                                pending = report.pending,
                                tokens = report.tokens,
                                "swept expired records"
                            );
                        } else {
                            debug!("sweep found nothing expired");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });
        info!(interval_secs = interval.as_secs(), "expiry sweep started");
        Self { shutdown, handle }
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "sweep task ended abnormally");
        }
        info!("expiry sweep stopped");
    }
}
