//! Directory sync bridge model.
//!
//! A bridge links one provider credential to one SCIM directory target for a
//! tenant. Its `state` column is the only mutual-exclusion point between
//! concurrent runners: a runner owns a bridge from the moment it flips the
//! row to `syncing` until it writes a terminal transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

use dirsync_core::SyncStats;

/// Lifecycle state of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "directory_bridge_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    /// Idle, scheduled by `next_sync_at`.
    Active,
    /// Claimed by a runner.
    Syncing,
    /// Last attempt failed; rescheduled with backoff.
    Failed,
    /// Too many consecutive failures. Never claimed until re-enabled.
    Disabled,
}

impl BridgeState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory sync bridge record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DirectoryBridge {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Provider kind tag (e.g. "google_workspace").
    pub kind: String,

    /// Provider credential used to authenticate against the upstream source.
    pub credential_id: Option<Uuid>,

    /// SCIM directory target the bridge pushes into.
    pub directory_id: Option<Uuid>,

    pub state: BridgeState,
    pub consecutive_failures: i32,
    pub total_sync_count: i64,
    pub total_failure_count: i64,
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Null while disabled.
    pub next_sync_at: Option<DateTime<Utc>>,

    /// When the current claim was taken. Doubles as the claim fence for
    /// transitions.
    pub sync_started_at: Option<DateTime<Utc>>,

    /// Last failure message, cleared on success.
    pub sync_error: Option<String>,

    /// Usernames never deactivated by the sync; deleted instead when they
    /// fall out of the provider.
    pub excluded_usernames: Vec<String>,

    /// Push every matched user even when nothing changed.
    pub force_update: bool,

    pub last_sync_stats: Option<Json<SyncStats>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new bridge.
#[derive(Debug)]
pub struct CreateDirectoryBridge {
    pub tenant_id: Uuid,
    pub kind: String,
    pub credential_id: Option<Uuid>,
    pub directory_id: Option<Uuid>,
    pub excluded_usernames: Vec<String>,
    pub force_update: bool,
    pub next_sync_at: Option<DateTime<Utc>>,
}

/// Columns written when a claimed sync succeeds.
#[derive(Debug, Clone)]
pub struct BridgeSuccessUpdate {
    pub synced_at: DateTime<Utc>,
    pub next_sync_at: DateTime<Utc>,
    pub stats: SyncStats,
}

/// Columns written when a claimed sync fails.
#[derive(Debug, Clone)]
pub struct BridgeFailureUpdate {
    /// `Failed` or `Disabled`.
    pub state: BridgeState,
    pub consecutive_failures: i32,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub error: String,
    pub stats: Option<SyncStats>,
}

impl DirectoryBridge {
    /// Create a new bridge record.
    pub async fn create<'e, E>(executor: E, data: &CreateDirectoryBridge) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as(
            r#"
            INSERT INTO directory_bridges
                (tenant_id, kind, credential_id, directory_id,
                 excluded_usernames, force_update, next_sync_at)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, NOW()))
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(&data.kind)
        .bind(data.credential_id)
        .bind(data.directory_id)
        .bind(&data.excluded_usernames)
        .bind(data.force_update)
        .bind(data.next_sync_at)
        .fetch_one(executor)
        .await
    }

    /// Find a bridge by ID within a specific tenant.
    pub async fn get_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM directory_bridges
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Claim the next due bridge for this runner.
    ///
    /// A bridge is due when it is `active`/`failed` and `next_sync_at <= now`,
    /// or when it has been `syncing` since before `stale_before` (its runner
    /// is presumed dead). The candidate row is locked with
    /// `FOR UPDATE SKIP LOCKED`, flipped to `syncing` and committed before
    /// returning, so concurrent runners never see the same row.
    pub async fn claim_next(
        pool: &PgPool,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let candidate: Option<(Uuid, BridgeState)> = sqlx::query_as(
            r#"
            SELECT id, state FROM directory_bridges
            WHERE (state IN ('active', 'failed') AND next_sync_at <= $1)
               OR (state = 'syncing' AND (sync_started_at IS NULL OR sync_started_at <= $2))
            ORDER BY COALESCE(next_sync_at, sync_started_at) ASC NULLS FIRST
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id, previous_state)) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        if previous_state == BridgeState::Syncing {
            tracing::warn!(bridge_id = %id, "Reclaiming stale directory sync");
        }

        let bridge: Self = sqlx::query_as(
            r#"
            UPDATE directory_bridges
            SET state = 'syncing',
                sync_started_at = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(bridge))
    }

    /// Lock a claimed bridge for a transition.
    ///
    /// Returns `None` if the claim identified by `claimed_at` no longer holds
    /// (the bridge was reclaimed after going stale).
    pub async fn lock_claimed<'e, E>(
        executor: E,
        tenant_id: Uuid,
        id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as(
            r#"
            SELECT * FROM directory_bridges
            WHERE id = $1 AND tenant_id = $2
              AND state = 'syncing' AND sync_started_at = $3
            FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(claimed_at)
        .fetch_optional(executor)
        .await
    }

    /// Transition a claimed bridge back to `active` after a successful sync.
    ///
    /// Returns false if the claim no longer holds.
    pub async fn mark_succeeded<'e, E>(
        executor: E,
        tenant_id: Uuid,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        update: &BridgeSuccessUpdate,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE directory_bridges
            SET state = 'active',
                consecutive_failures = 0,
                total_sync_count = total_sync_count + 1,
                last_synced_at = $4,
                next_sync_at = $5,
                sync_started_at = NULL,
                sync_error = NULL,
                last_sync_stats = $6,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
              AND state = 'syncing' AND sync_started_at = $3
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(claimed_at)
        .bind(update.synced_at)
        .bind(update.next_sync_at)
        .bind(Json(update.stats))
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a locked bridge to `failed` or `disabled`.
    ///
    /// Callers lock the row with [`DirectoryBridge::lock_claimed`] in the same
    /// transaction so `consecutive_failures` is never read-modified-written
    /// outside it.
    pub async fn mark_failed<'e, E>(
        executor: E,
        tenant_id: Uuid,
        id: Uuid,
        update: &BridgeFailureUpdate,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE directory_bridges
            SET state = $3,
                consecutive_failures = $4,
                total_sync_count = total_sync_count + 1,
                total_failure_count = total_failure_count + 1,
                next_sync_at = $5,
                sync_started_at = NULL,
                sync_error = $6,
                last_sync_stats = COALESCE($7, last_sync_stats),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(update.state)
        .bind(update.consecutive_failures)
        .bind(update.next_sync_at)
        .bind(&update.error)
        .bind(update.stats.map(Json))
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
