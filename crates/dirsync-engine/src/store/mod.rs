//! Persistence seam for the bridge runner.
//!
//! The runner and syncer only talk to storage through [`BridgeStore`], so
//! the claim/transition state machine can be exercised without Postgres.

mod postgres;

pub use postgres::PgBridgeStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use dirsync_core::SyncStats;
use dirsync_db::models::{BridgeSuccessUpdate, DirectoryBridge, DirectoryTarget, ProviderCredential};

use crate::backoff::{BackoffPolicy, FailureTransition};
use crate::error::SyncError;

/// A provider credential re-encrypted after an `OAuth2` refresh.
#[derive(Clone)]
pub struct RefreshedCredential {
    pub credential_id: Uuid,
    pub credentials_encrypted: Vec<u8>,
    pub credentials_key_version: i32,
}

impl std::fmt::Debug for RefreshedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedCredential")
            .field("credential_id", &self.credential_id)
            .field("credentials_key_version", &self.credentials_key_version)
            .finish_non_exhaustive()
    }
}

/// Storage operations used by the runner and syncer.
///
/// Transitions are fenced on the claim: they only apply while the bridge is
/// still `syncing` with `sync_started_at == claimed_at`.
#[async_trait]
pub trait BridgeStore: Send + Sync {
    /// Atomically claim one due or stale bridge.
    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<DirectoryBridge>, SyncError>;

    async fn load_credential(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<Option<ProviderCredential>, SyncError>;

    async fn load_directory(
        &self,
        tenant_id: Uuid,
        directory_id: Uuid,
    ) -> Result<Option<DirectoryTarget>, SyncError>;

    /// Store the hash of a new directory bearer token.
    async fn rotate_directory_token(
        &self,
        tenant_id: Uuid,
        directory_id: Uuid,
        token_hash: &str,
    ) -> Result<bool, SyncError>;

    /// Transition a claimed bridge to `active`.
    ///
    /// A refreshed credential is written best-effort in the same
    /// transaction. Returns false if the claim was lost.
    async fn complete_success(
        &self,
        bridge: &DirectoryBridge,
        claimed_at: DateTime<Utc>,
        update: &BridgeSuccessUpdate,
        refreshed: Option<&RefreshedCredential>,
    ) -> Result<bool, SyncError>;

    /// Transition a claimed bridge to `failed` or `disabled`.
    ///
    /// The failure count is read and written under one row lock. Returns
    /// `None` if the claim was lost.
    async fn complete_failure(
        &self,
        bridge: &DirectoryBridge,
        claimed_at: DateTime<Utc>,
        policy: &BackoffPolicy,
        now: DateTime<Utc>,
        error: &str,
        stats: Option<SyncStats>,
    ) -> Result<Option<FailureTransition>, SyncError>;
}
