//! In-memory [`BridgeStore`] mirroring the Postgres claim and transition
//! semantics.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use dirsync_core::SyncStats;
use dirsync_db::models::{
    BridgeState, BridgeSuccessUpdate, DirectoryBridge, DirectoryTarget, ProviderCredential,
};
use dirsync_engine::{BackoffPolicy, BridgeStore, FailureTransition, RefreshedCredential, SyncError};

#[derive(Default)]
struct Inner {
    bridges: HashMap<Uuid, DirectoryBridge>,
    credentials: HashMap<Uuid, ProviderCredential>,
    directories: HashMap<Uuid, DirectoryTarget>,
    fail_credential_writes: bool,
    fail_claims: bool,
}

#[derive(Default)]
pub struct MemoryBridgeStore {
    inner: Mutex<Inner>,
}

impl MemoryBridgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bridge(&self, bridge: DirectoryBridge) -> Uuid {
        let id = bridge.id;
        self.inner.lock().unwrap().bridges.insert(id, bridge);
        id
    }

    pub fn bridge(&self, id: Uuid) -> DirectoryBridge {
        self.inner.lock().unwrap().bridges[&id].clone()
    }

    pub fn update_bridge(&self, id: Uuid, f: impl FnOnce(&mut DirectoryBridge)) {
        let mut inner = self.inner.lock().unwrap();
        f(inner.bridges.get_mut(&id).expect("bridge exists"));
    }

    pub fn insert_credential(&self, credential: ProviderCredential) -> Uuid {
        let id = credential.id;
        self.inner.lock().unwrap().credentials.insert(id, credential);
        id
    }

    pub fn credential(&self, id: Uuid) -> ProviderCredential {
        self.inner.lock().unwrap().credentials[&id].clone()
    }

    pub fn insert_directory(&self, directory: DirectoryTarget) -> Uuid {
        let id = directory.id;
        self.inner.lock().unwrap().directories.insert(id, directory);
        id
    }

    pub fn directory(&self, id: Uuid) -> DirectoryTarget {
        self.inner.lock().unwrap().directories[&id].clone()
    }

    pub fn fail_credential_writes(&self) {
        self.inner.lock().unwrap().fail_credential_writes = true;
    }

    pub fn fail_claims(&self) {
        self.inner.lock().unwrap().fail_claims = true;
    }
}

fn holds_claim(bridge: &DirectoryBridge, claimed_at: DateTime<Utc>) -> bool {
    bridge.state == BridgeState::Syncing && bridge.sync_started_at == Some(claimed_at)
}

#[async_trait]
impl BridgeStore for MemoryBridgeStore {
    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<DirectoryBridge>, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_claims {
            return Err(SyncError::from(sqlx::Error::PoolTimedOut));
        }

        let candidate = inner
            .bridges
            .values()
            .filter(|b| match b.state {
                BridgeState::Active | BridgeState::Failed => {
                    b.next_sync_at.is_some_and(|at| at <= now)
                }
                BridgeState::Syncing => b.sync_started_at.map_or(true, |at| at <= stale_before),
                BridgeState::Disabled => false,
            })
            .min_by_key(|b| b.next_sync_at.or(b.sync_started_at))
            .map(|b| b.id);

        Ok(candidate.and_then(|id| {
            let bridge = inner.bridges.get_mut(&id)?;
            bridge.state = BridgeState::Syncing;
            bridge.sync_started_at = Some(now);
            bridge.updated_at = now;
            Some(bridge.clone())
        }))
    }

    async fn load_credential(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<Option<ProviderCredential>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .credentials
            .get(&credential_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn load_directory(
        &self,
        tenant_id: Uuid,
        directory_id: Uuid,
    ) -> Result<Option<DirectoryTarget>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .directories
            .get(&directory_id)
            .filter(|d| d.tenant_id == tenant_id)
            .cloned())
    }

    async fn rotate_directory_token(
        &self,
        tenant_id: Uuid,
        directory_id: Uuid,
        token_hash: &str,
    ) -> Result<bool, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.directories.get_mut(&directory_id) {
            Some(directory) if directory.tenant_id == tenant_id => {
                directory.token_hash = Some(token_hash.to_string());
                directory.token_rotated_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_success(
        &self,
        bridge: &DirectoryBridge,
        claimed_at: DateTime<Utc>,
        update: &BridgeSuccessUpdate,
        refreshed: Option<&RefreshedCredential>,
    ) -> Result<bool, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        let fail_credential_writes = inner.fail_credential_writes;

        let Some(row) = inner.bridges.get_mut(&bridge.id) else {
            return Ok(false);
        };
        if !holds_claim(row, claimed_at) {
            return Ok(false);
        }

        row.state = BridgeState::Active;
        row.consecutive_failures = 0;
        row.total_sync_count += 1;
        row.last_synced_at = Some(update.synced_at);
        row.next_sync_at = Some(update.next_sync_at);
        row.sync_started_at = None;
        row.sync_error = None;
        row.last_sync_stats = Some(Json(update.stats));

        if let Some(credential) = refreshed {
            if !fail_credential_writes {
                if let Some(stored) = inner.credentials.get_mut(&credential.credential_id) {
                    stored.credentials_encrypted = credential.credentials_encrypted.clone();
                    stored.credentials_key_version = credential.credentials_key_version;
                }
            }
        }
        Ok(true)
    }

    async fn complete_failure(
        &self,
        bridge: &DirectoryBridge,
        claimed_at: DateTime<Utc>,
        policy: &BackoffPolicy,
        now: DateTime<Utc>,
        error: &str,
        stats: Option<SyncStats>,
    ) -> Result<Option<FailureTransition>, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner.bridges.get_mut(&bridge.id) else {
            return Ok(None);
        };
        if !holds_claim(row, claimed_at) {
            return Ok(None);
        }

        let transition = policy.failure_transition(row.consecutive_failures, now);
        row.state = transition.state;
        row.consecutive_failures = transition.consecutive_failures;
        row.total_sync_count += 1;
        row.total_failure_count += 1;
        row.next_sync_at = transition.next_sync_at;
        row.sync_started_at = None;
        row.sync_error = Some(error.to_string());
        if let Some(stats) = stats {
            row.last_sync_stats = Some(Json(stats));
        }
        Ok(Some(transition))
    }
}

/// A due bridge with no failures.
pub fn due_bridge(tenant_id: Uuid, kind: &str) -> DirectoryBridge {
    let now = Utc::now();
    DirectoryBridge {
        id: Uuid::new_v4(),
        tenant_id,
        kind: kind.to_string(),
        credential_id: None,
        directory_id: None,
        state: BridgeState::Active,
        consecutive_failures: 0,
        total_sync_count: 0,
        total_failure_count: 0,
        last_synced_at: None,
        next_sync_at: Some(now - chrono::Duration::seconds(1)),
        sync_started_at: None,
        sync_error: None,
        excluded_usernames: Vec::new(),
        force_update: false,
        last_sync_stats: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn credential(tenant_id: Uuid, provider: &str, encrypted: Vec<u8>) -> ProviderCredential {
    let now = Utc::now();
    ProviderCredential {
        id: Uuid::new_v4(),
        tenant_id,
        provider: provider.to_string(),
        credentials_encrypted: encrypted,
        credentials_key_version: 1,
        created_at: now,
        updated_at: now,
    }
}

pub fn directory(tenant_id: Uuid, base_url: &str) -> DirectoryTarget {
    let now = Utc::now();
    DirectoryTarget {
        id: Uuid::new_v4(),
        tenant_id,
        base_url: base_url.to_string(),
        token_hash: None,
        token_rotated_at: None,
        request_timeout_secs: 5,
        page_size: 2,
        created_at: now,
        updated_at: now,
    }
}
