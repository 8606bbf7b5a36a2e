//! Bridge runner: claim, sync, transition.
//!
//! Each tick claims at most one due bridge, runs its sync under a timeout
//! and writes exactly one terminal transition, whatever way the sync ended.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use dirsync_core::SyncStats;
use dirsync_db::models::{BridgeState, BridgeSuccessUpdate, DirectoryBridge};

use crate::backoff::{add_clamped, BackoffPolicy, FailureTransition};
use crate::config::RunnerConfig;
use crate::error::SyncError;
use crate::store::BridgeStore;
use crate::syncer::{BridgeSyncer, SyncOutcome};

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was due.
    Idle,
    /// The claim query failed.
    ClaimFailed,
    Succeeded(SyncStats),
    Failed(FailureTransition),
    /// Another runner took the bridge over before the transition.
    ClaimLost,
    /// The transition itself could not be written.
    TransitionFailed,
}

/// Polls for due bridges and drives them through the state machine.
pub struct BridgeRunner {
    store: Arc<dyn BridgeStore>,
    syncer: Arc<dyn BridgeSyncer>,
    config: RunnerConfig,
    backoff: BackoffPolicy,
}

impl std::fmt::Debug for BridgeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRunner")
            .field("config", &self.config)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl BridgeRunner {
    /// Build a runner, rejecting an invalid configuration.
    pub fn new(
        store: Arc<dyn BridgeStore>,
        syncer: Arc<dyn BridgeSyncer>,
        config: RunnerConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let backoff = config.backoff_policy();
        Ok(Self {
            store,
            syncer,
            config,
            backoff,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Cancellation stops the poll loop and cancels an in-flight sync, which
    /// is then transitioned as a failure before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            sync_interval_secs = self.config.sync_interval.as_secs(),
            sync_timeout_secs = self.config.sync_timeout.as_secs(),
            dry_run = self.config.dry_run,
            "Starting directory sync runner"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick(&shutdown).await;
                }
            }
        }

        info!("Directory sync runner stopped");
    }

    /// Attempt one claim-and-process cycle.
    pub async fn tick(&self, shutdown: &CancellationToken) -> TickOutcome {
        let now = Utc::now();
        let stale_before = chrono::Duration::from_std(self.config.stale_sync_threshold)
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        match self.store.claim_next(now, stale_before).await {
            Ok(Some(bridge)) => self.process(bridge, shutdown).await,
            Ok(None) => {
                debug!("No directory bridge due");
                TickOutcome::Idle
            }
            Err(e) => {
                error!(error = %e, "Failed to claim directory bridge");
                TickOutcome::ClaimFailed
            }
        }
    }

    #[instrument(skip(self, bridge, shutdown), fields(bridge_id = %bridge.id, tenant_id = %bridge.tenant_id, kind = %bridge.kind))]
    async fn process(&self, bridge: DirectoryBridge, shutdown: &CancellationToken) -> TickOutcome {
        let Some(claimed_at) = bridge.sync_started_at else {
            error!("Claimed bridge has no sync_started_at");
            return TickOutcome::ClaimFailed;
        };

        info!(
            consecutive_failures = bridge.consecutive_failures,
            "Starting directory sync"
        );

        match self.run_sync(&bridge, shutdown).await {
            Ok(outcome) => self.complete_success(&bridge, claimed_at, outcome).await,
            Err(e) => self.complete_failure(&bridge, claimed_at, &e).await,
        }
    }

    /// Run the sync, folding timeout, shutdown and panics into errors.
    async fn run_sync(
        &self,
        bridge: &DirectoryBridge,
        shutdown: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let sync = AssertUnwindSafe(self.syncer.sync(bridge)).catch_unwind();

        tokio::select! {
            biased;
            () = shutdown.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.config.sync_timeout, sync) => match result {
                Err(_) => Err(SyncError::Timeout {
                    timeout: self.config.sync_timeout,
                }),
                Ok(Err(panic)) => Err(SyncError::Panicked {
                    message: panic_message(panic.as_ref()),
                }),
                Ok(Ok(result)) => result,
            },
        }
    }

    async fn complete_success(
        &self,
        bridge: &DirectoryBridge,
        claimed_at: DateTime<Utc>,
        outcome: SyncOutcome,
    ) -> TickOutcome {
        let now = Utc::now();
        let update = BridgeSuccessUpdate {
            synced_at: now,
            next_sync_at: add_clamped(now, self.config.sync_interval),
            stats: outcome.stats,
        };

        match self
            .store
            .complete_success(bridge, claimed_at, &update, outcome.refreshed_credential.as_ref())
            .await
        {
            Ok(true) => {
                info!(
                    created = outcome.stats.created,
                    updated = outcome.stats.updated,
                    deleted = outcome.stats.deleted,
                    deactivated = outcome.stats.deactivated,
                    skipped = outcome.stats.skipped,
                    credential_refreshed = outcome.refreshed_credential.is_some(),
                    next_sync_at = %update.next_sync_at,
                    "Directory sync completed"
                );
                TickOutcome::Succeeded(outcome.stats)
            }
            Ok(false) => {
                warn!("Claim lost before success could be recorded");
                TickOutcome::ClaimLost
            }
            Err(e) => {
                error!(error = %e, "Failed to record directory sync success");
                TickOutcome::TransitionFailed
            }
        }
    }

    async fn complete_failure(
        &self,
        bridge: &DirectoryBridge,
        claimed_at: DateTime<Utc>,
        sync_error: &SyncError,
    ) -> TickOutcome {
        let message = sync_error.to_string();

        match self
            .store
            .complete_failure(
                bridge,
                claimed_at,
                &self.backoff,
                Utc::now(),
                &message,
                sync_error.partial_stats(),
            )
            .await
        {
            Ok(Some(transition)) => {
                if transition.state == BridgeState::Disabled {
                    error!(
                        error = %message,
                        consecutive_failures = transition.consecutive_failures,
                        config_error = sync_error.is_config_error(),
                        "Directory sync failed; bridge disabled"
                    );
                } else {
                    warn!(
                        error = %message,
                        consecutive_failures = transition.consecutive_failures,
                        config_error = sync_error.is_config_error(),
                        next_sync_at = ?transition.next_sync_at,
                        "Directory sync failed"
                    );
                }
                TickOutcome::Failed(transition)
            }
            Ok(None) => {
                warn!(error = %message, "Claim lost before failure could be recorded");
                TickOutcome::ClaimLost
            }
            Err(e) => {
                error!(
                    error = %e,
                    sync_error = %message,
                    "Failed to record directory sync failure"
                );
                TickOutcome::TransitionFailed
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
