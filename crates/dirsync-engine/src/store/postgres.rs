//! `PostgreSQL` bridge store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Acquire, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

use dirsync_core::SyncStats;
use dirsync_db::models::{
    BridgeFailureUpdate, BridgeSuccessUpdate, DirectoryBridge, DirectoryTarget, ProviderCredential,
};

use super::{BridgeStore, RefreshedCredential};
use crate::backoff::{BackoffPolicy, FailureTransition};
use crate::error::SyncError;

/// [`BridgeStore`] backed by the `dirsync-db` models.
#[derive(Debug, Clone)]
pub struct PgBridgeStore {
    pool: PgPool,
}

impl PgBridgeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BridgeStore for PgBridgeStore {
    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<DirectoryBridge>, SyncError> {
        Ok(DirectoryBridge::claim_next(&self.pool, now, stale_before).await?)
    }

    async fn load_credential(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<Option<ProviderCredential>, SyncError> {
        Ok(ProviderCredential::get_by_id(&self.pool, tenant_id, credential_id).await?)
    }

    async fn load_directory(
        &self,
        tenant_id: Uuid,
        directory_id: Uuid,
    ) -> Result<Option<DirectoryTarget>, SyncError> {
        Ok(DirectoryTarget::get_by_id(&self.pool, tenant_id, directory_id).await?)
    }

    async fn rotate_directory_token(
        &self,
        tenant_id: Uuid,
        directory_id: Uuid,
        token_hash: &str,
    ) -> Result<bool, SyncError> {
        Ok(DirectoryTarget::rotate_token(&self.pool, tenant_id, directory_id, token_hash).await?)
    }

    async fn complete_success(
        &self,
        bridge: &DirectoryBridge,
        claimed_at: DateTime<Utc>,
        update: &BridgeSuccessUpdate,
        refreshed: Option<&RefreshedCredential>,
    ) -> Result<bool, SyncError> {
        let mut tx = self.pool.begin().await?;

        let applied = DirectoryBridge::mark_succeeded(
            &mut *tx,
            bridge.tenant_id,
            bridge.id,
            claimed_at,
            update,
        )
        .await?;

        if !applied {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(credential) = refreshed {
            // Savepoint so a failed credential write leaves the transition intact.
            let mut savepoint = Acquire::begin(&mut tx).await?;
            let written = ProviderCredential::update_credentials(
                &mut *savepoint,
                bridge.tenant_id,
                credential.credential_id,
                &credential.credentials_encrypted,
                credential.credentials_key_version,
            )
            .await;

            match written {
                Ok(true) => {
                    savepoint.commit().await?;
                    debug!(
                        bridge_id = %bridge.id,
                        credential_id = %credential.credential_id,
                        "Persisted refreshed provider credential"
                    );
                }
                Ok(false) => {
                    savepoint.rollback().await?;
                    warn!(
                        bridge_id = %bridge.id,
                        credential_id = %credential.credential_id,
                        "Provider credential vanished before refresh could be saved"
                    );
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    warn!(
                        bridge_id = %bridge.id,
                        credential_id = %credential.credential_id,
                        error = %e,
                        "Failed to persist refreshed provider credential"
                    );
                }
            }
        }

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        let Some(locked) =
            DirectoryBridge::lock_claimed(&mut *tx, bridge.tenant_id, bridge.id, claimed_at).await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let transition = policy.failure_transition(locked.consecutive_failures, now);
        let update = BridgeFailureUpdate {
            state: transition.state,
            consecutive_failures: transition.consecutive_failures,
            next_sync_at: transition.next_sync_at,
            error: error.to_string(),
            stats,
        };

        DirectoryBridge::mark_failed(&mut *tx, bridge.tenant_id, bridge.id, &update).await?;
        tx.commit().await?;

        Ok(Some(transition))
    }
}
