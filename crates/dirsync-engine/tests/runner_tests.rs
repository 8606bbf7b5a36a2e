//! Bridge runner state machine tests over the in-memory store.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use dirsync_core::SyncStats;
use dirsync_db::models::{BridgeState, DirectoryBridge};
use dirsync_engine::{
    BridgeRunner, BridgeSyncer, MutationFailure, ReconcileError, RefreshedCredential, RunnerConfig,
    SyncError, SyncOutcome, TickOutcome,
};

use helpers::init_test_logging;
use helpers::memory_store::{credential, due_bridge, MemoryBridgeStore};

type Respond = dyn Fn(&DirectoryBridge) -> Result<SyncOutcome, SyncError> + Send + Sync;

/// Syncer whose result is scripted per test.
struct ScriptedSyncer {
    respond: Box<Respond>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedSyncer {
    fn new(
        respond: impl Fn(&DirectoryBridge) -> Result<SyncOutcome, SyncError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn succeeding(stats: SyncStats) -> Self {
        Self::new(move |_| {
            Ok(SyncOutcome {
                stats,
                refreshed_credential: None,
            })
        })
    }

    fn failing(message: &'static str) -> Self {
        Self::new(move |_| Err(SyncError::configuration(message)))
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BridgeSyncer for ScriptedSyncer {
    async fn sync(&self, bridge: &DirectoryBridge) -> Result<SyncOutcome, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(bridge)
    }
}

fn stats(created: u32, updated: u32) -> SyncStats {
    SyncStats {
        created,
        updated,
        ..Default::default()
    }
}

fn runner(store: &Arc<MemoryBridgeStore>, syncer: Arc<ScriptedSyncer>, config: RunnerConfig) -> BridgeRunner {
    BridgeRunner::new(store.clone(), syncer, config).expect("valid config")
}

fn default_runner(store: &Arc<MemoryBridgeStore>, syncer: ScriptedSyncer) -> BridgeRunner {
    runner(store, Arc::new(syncer), RunnerConfig::default())
}

fn assert_near(actual: chrono::DateTime<Utc>, expected: chrono::DateTime<Utc>) {
    let drift = (actual - expected).num_seconds().abs();
    assert!(drift <= 5, "expected {expected}, got {actual}");
}

#[tokio::test]
async fn test_idle_when_nothing_due() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let mut bridge = due_bridge(Uuid::new_v4(), "google_workspace");
    bridge.next_sync_at = Some(Utc::now() + chrono::Duration::minutes(5));
    store.insert_bridge(bridge);

    let syncer = Arc::new(ScriptedSyncer::succeeding(SyncStats::default()));
    let outcome = runner(&store, syncer.clone(), RunnerConfig::default())
        .tick(&CancellationToken::new())
        .await;

    assert_eq!(outcome, TickOutcome::Idle);
    assert_eq!(syncer.calls(), 0);
}

#[tokio::test]
async fn test_claim_error_is_reported_and_loop_continues() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    store.fail_claims();

    let outcome = default_runner(&store, ScriptedSyncer::succeeding(SyncStats::default()))
        .tick(&CancellationToken::new())
        .await;

    assert_eq!(outcome, TickOutcome::ClaimFailed);
}

#[tokio::test]
async fn test_success_resets_failures_and_schedules_next_sync() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let mut bridge = due_bridge(Uuid::new_v4(), "google_workspace");
    bridge.state = BridgeState::Failed;
    bridge.consecutive_failures = 3;
    bridge.sync_error = Some("previous failure".into());
    let id = store.insert_bridge(bridge);

    let outcome = default_runner(&store, ScriptedSyncer::succeeding(stats(2, 1)))
        .tick(&CancellationToken::new())
        .await;

    assert_eq!(outcome, TickOutcome::Succeeded(stats(2, 1)));
    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Active);
    assert_eq!(bridge.consecutive_failures, 0);
    assert_eq!(bridge.total_sync_count, 1);
    assert!(bridge.sync_error.is_none());
    assert!(bridge.sync_started_at.is_none());
    assert!(bridge.last_synced_at.is_some());
    assert_eq!(bridge.last_sync_stats.map(|s| s.0), Some(stats(2, 1)));
    assert_near(
        bridge.next_sync_at.expect("scheduled"),
        Utc::now() + chrono::Duration::minutes(15),
    );
}

#[tokio::test]
async fn test_first_failure_backs_off() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let id = store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    let outcome = default_runner(&store, ScriptedSyncer::failing("directory unreachable"))
        .tick(&CancellationToken::new())
        .await;

    assert!(matches!(outcome, TickOutcome::Failed(t) if t.state == BridgeState::Failed));
    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Failed);
    assert_eq!(bridge.consecutive_failures, 1);
    assert_eq!(bridge.total_failure_count, 1);
    assert_eq!(bridge.total_sync_count, 1);
    assert_eq!(
        bridge.sync_error.as_deref(),
        Some("Configuration error: directory unreachable")
    );
    assert_near(
        bridge.next_sync_at.expect("scheduled"),
        Utc::now() + chrono::Duration::minutes(30),
    );
}

#[tokio::test]
async fn test_failure_below_cap_stays_failed_with_ceiling_backoff() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let mut bridge = due_bridge(Uuid::new_v4(), "google_workspace");
    bridge.state = BridgeState::Failed;
    bridge.consecutive_failures = 8;
    let id = store.insert_bridge(bridge);

    default_runner(&store, ScriptedSyncer::failing("boom"))
        .tick(&CancellationToken::new())
        .await;

    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Failed);
    assert_eq!(bridge.consecutive_failures, 9);
    assert_near(
        bridge.next_sync_at.expect("scheduled"),
        Utc::now() + chrono::Duration::hours(24),
    );
}

#[tokio::test]
async fn test_failure_at_cap_disables_bridge() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let mut bridge = due_bridge(Uuid::new_v4(), "google_workspace");
    bridge.state = BridgeState::Failed;
    bridge.consecutive_failures = 9;
    let id = store.insert_bridge(bridge);

    let syncer = Arc::new(ScriptedSyncer::failing("boom"));
    let runner = runner(&store, syncer.clone(), RunnerConfig::default());
    let outcome = runner.tick(&CancellationToken::new()).await;

    assert!(matches!(outcome, TickOutcome::Failed(t) if t.state == BridgeState::Disabled));
    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Disabled);
    assert_eq!(bridge.consecutive_failures, 10);
    assert!(bridge.next_sync_at.is_none());

    // Disabled bridges are never claimed again.
    assert_eq!(runner.tick(&CancellationToken::new()).await, TickOutcome::Idle);
    assert_eq!(syncer.calls(), 1);
}

#[tokio::test]
async fn test_custom_failure_cap() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let id = store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    let config = RunnerConfig {
        max_consecutive_failures: 1,
        ..Default::default()
    };
    runner(&store, Arc::new(ScriptedSyncer::failing("boom")), config)
        .tick(&CancellationToken::new())
        .await;

    assert_eq!(store.bridge(id).state, BridgeState::Disabled);
}

#[tokio::test]
async fn test_partial_reconcile_failure_keeps_stats() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let id = store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    let syncer = ScriptedSyncer::new(|_| {
        Err(SyncError::Reconcile(ReconcileError {
            stats: stats(4, 0),
            failures: vec![MutationFailure {
                mutation: dirsync_engine::reconcile::Mutation::Create,
                username: "bad@x.com".into(),
                message: "SCIM error (500): boom".into(),
            }],
        }))
    });
    default_runner(&store, syncer)
        .tick(&CancellationToken::new())
        .await;

    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Failed);
    assert_eq!(bridge.last_sync_stats.map(|s| s.0), Some(stats(4, 0)));
    let error = bridge.sync_error.expect("error recorded");
    assert!(error.starts_with("1 directory mutation(s) failed"), "{error}");
    assert!(error.contains("create bad@x.com"));
}

#[tokio::test]
async fn test_panic_is_caught_and_transitioned() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let id = store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    let syncer = ScriptedSyncer::new(|_| panic!("adapter exploded"));
    let outcome = default_runner(&store, syncer)
        .tick(&CancellationToken::new())
        .await;

    assert!(matches!(outcome, TickOutcome::Failed(_)));
    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Failed);
    assert_eq!(
        bridge.sync_error.as_deref(),
        Some("sync panicked: adapter exploded")
    );
}

#[tokio::test]
async fn test_timeout_is_a_failure() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let id = store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    let config = RunnerConfig {
        sync_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let syncer = ScriptedSyncer::succeeding(SyncStats::default()).with_delay(Duration::from_secs(30));
    runner(&store, Arc::new(syncer), config)
        .tick(&CancellationToken::new())
        .await;

    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Failed);
    assert_eq!(bridge.sync_error.as_deref(), Some("sync timed out after 50ms"));
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_sync() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let id = store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    let shutdown = CancellationToken::new();
    let syncer = ScriptedSyncer::succeeding(SyncStats::default()).with_delay(Duration::from_secs(30));
    let runner = runner(&store, Arc::new(syncer), RunnerConfig::default());

    let cancel = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let outcome = runner.tick(&shutdown).await;

    assert!(matches!(outcome, TickOutcome::Failed(_)));
    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Failed);
    assert_eq!(bridge.sync_error.as_deref(), Some("sync cancelled by shutdown"));
}

#[tokio::test]
async fn test_stale_sync_is_reclaimed() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let mut bridge = due_bridge(Uuid::new_v4(), "google_workspace");
    bridge.state = BridgeState::Syncing;
    bridge.next_sync_at = None;
    bridge.sync_started_at = Some(Utc::now() - chrono::Duration::minutes(11));
    let id = store.insert_bridge(bridge);

    let outcome = default_runner(&store, ScriptedSyncer::succeeding(stats(1, 0)))
        .tick(&CancellationToken::new())
        .await;

    assert_eq!(outcome, TickOutcome::Succeeded(stats(1, 0)));
    assert_eq!(store.bridge(id).state, BridgeState::Active);
}

#[tokio::test]
async fn test_live_sync_is_not_reclaimed() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let mut bridge = due_bridge(Uuid::new_v4(), "google_workspace");
    bridge.state = BridgeState::Syncing;
    bridge.sync_started_at = Some(Utc::now() - chrono::Duration::minutes(1));
    store.insert_bridge(bridge);

    let outcome = default_runner(&store, ScriptedSyncer::succeeding(SyncStats::default()))
        .tick(&CancellationToken::new())
        .await;

    assert_eq!(outcome, TickOutcome::Idle);
}

#[tokio::test]
async fn test_concurrent_runners_claim_exclusively() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    let syncer = Arc::new(
        ScriptedSyncer::succeeding(SyncStats::default()).with_delay(Duration::from_millis(50)),
    );
    let first = runner(&store, syncer.clone(), RunnerConfig::default());
    let second = runner(&store, syncer.clone(), RunnerConfig::default());
    let shutdown = CancellationToken::new();

    let (a, b) = tokio::join!(first.tick(&shutdown), second.tick(&shutdown));

    let succeeded = [&a, &b]
        .iter()
        .filter(|o| matches!(o, TickOutcome::Succeeded(_)))
        .count();
    assert_eq!(succeeded, 1, "outcomes: {a:?}, {b:?}");
    assert!(a == TickOutcome::Idle || b == TickOutcome::Idle);
    assert_eq!(syncer.calls(), 1);
}

#[tokio::test]
async fn test_lost_claim_is_not_overwritten() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let id = store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    // Another runner reclaims the bridge while this sync is running.
    let reclaimed_at = Utc::now() + chrono::Duration::minutes(11);
    let store_in_sync = store.clone();
    let syncer = ScriptedSyncer::new(move |bridge| {
        store_in_sync.update_bridge(bridge.id, |row| row.sync_started_at = Some(reclaimed_at));
        Err(SyncError::configuration("boom"))
    });
    let outcome = default_runner(&store, syncer)
        .tick(&CancellationToken::new())
        .await;

    assert_eq!(outcome, TickOutcome::ClaimLost);
    let bridge = store.bridge(id);
    assert_eq!(bridge.state, BridgeState::Syncing);
    assert_eq!(bridge.consecutive_failures, 0);
    assert_eq!(bridge.sync_started_at, Some(reclaimed_at));
}

#[tokio::test]
async fn test_refreshed_credential_is_persisted_on_success() {
    init_test_logging();
    let tenant_id = Uuid::new_v4();
    let store = Arc::new(MemoryBridgeStore::new());
    let credential_id = store.insert_credential(credential(tenant_id, "google_workspace", vec![1, 2, 3]));
    let mut bridge = due_bridge(tenant_id, "google_workspace");
    bridge.credential_id = Some(credential_id);
    store.insert_bridge(bridge);

    let syncer = ScriptedSyncer::new(move |_| {
        Ok(SyncOutcome {
            stats: SyncStats::default(),
            refreshed_credential: Some(RefreshedCredential {
                credential_id,
                credentials_encrypted: vec![9, 9, 9],
                credentials_key_version: 1,
            }),
        })
    });
    default_runner(&store, syncer)
        .tick(&CancellationToken::new())
        .await;

    assert_eq!(store.credential(credential_id).credentials_encrypted, vec![9, 9, 9]);
}

#[tokio::test]
async fn test_credential_write_failure_does_not_fail_sync() {
    init_test_logging();
    let tenant_id = Uuid::new_v4();
    let store = Arc::new(MemoryBridgeStore::new());
    store.fail_credential_writes();
    let credential_id = store.insert_credential(credential(tenant_id, "google_workspace", vec![1, 2, 3]));
    let mut bridge = due_bridge(tenant_id, "google_workspace");
    bridge.credential_id = Some(credential_id);
    let id = store.insert_bridge(bridge);

    let syncer = ScriptedSyncer::new(move |_| {
        Ok(SyncOutcome {
            stats: SyncStats::default(),
            refreshed_credential: Some(RefreshedCredential {
                credential_id,
                credentials_encrypted: vec![9, 9, 9],
                credentials_key_version: 1,
            }),
        })
    });
    let outcome = default_runner(&store, syncer)
        .tick(&CancellationToken::new())
        .await;

    assert!(matches!(outcome, TickOutcome::Succeeded(_)));
    assert_eq!(store.bridge(id).state, BridgeState::Active);
    assert_eq!(store.credential(credential_id).credentials_encrypted, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_due_bridges_are_taken_oldest_first() {
    init_test_logging();
    let tenant_id = Uuid::new_v4();
    let store = Arc::new(MemoryBridgeStore::new());

    let mut newer = due_bridge(tenant_id, "google_workspace");
    newer.next_sync_at = Some(Utc::now() - chrono::Duration::minutes(1));
    let newer_id = store.insert_bridge(newer);
    let mut older = due_bridge(tenant_id, "google_workspace");
    older.next_sync_at = Some(Utc::now() - chrono::Duration::hours(1));
    let older_id = store.insert_bridge(older);

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_in_sync = seen.clone();
    let syncer = ScriptedSyncer::new(move |bridge| {
        seen_in_sync.lock().unwrap().push(bridge.id);
        Ok(SyncOutcome::default())
    });
    let runner = default_runner(&store, syncer);
    runner.tick(&CancellationToken::new()).await;
    runner.tick(&CancellationToken::new()).await;

    assert_eq!(*seen.lock().unwrap(), vec![older_id, newer_id]);
}

#[tokio::test]
async fn test_run_loop_processes_and_stops_on_shutdown() {
    init_test_logging();
    let store = Arc::new(MemoryBridgeStore::new());
    let id = store.insert_bridge(due_bridge(Uuid::new_v4(), "google_workspace"));

    let config = RunnerConfig {
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    };
    let syncer = Arc::new(ScriptedSyncer::succeeding(stats(1, 0)));
    let runner = Arc::new(runner(&store, syncer.clone(), config));
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn({
        let runner = runner.clone();
        let shutdown = shutdown.clone();
        async move { runner.run(shutdown).await }
    });

    for _ in 0..100 {
        if store.bridge(id).state == BridgeState::Active && syncer.calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("runner stops")
        .expect("runner task");

    assert_eq!(store.bridge(id).state, BridgeState::Active);
    assert_eq!(syncer.calls(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let store = Arc::new(MemoryBridgeStore::new());
    let config = RunnerConfig {
        sync_timeout: Duration::from_secs(600),
        stale_sync_threshold: Duration::from_secs(600),
        ..Default::default()
    };
    let result = BridgeRunner::new(
        store,
        Arc::new(ScriptedSyncer::succeeding(SyncStats::default())),
        config,
    );
    assert!(matches!(result, Err(e) if e.is_config_error()));
}
