//! SCIM directory target model.
//!
//! The directory authenticates the sync with a bearer token whose SHA-256
//! hash is stored here. The token is regenerated before every sync pass, so
//! only the hash ever touches the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

/// A SCIM directory target record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DirectoryTarget {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Base URL of the SCIM endpoint (e.g. "https://dir.example.com/scim/v2").
    pub base_url: String,

    /// SHA-256 hex digest of the current bearer token.
    #[serde(skip_serializing)]
    pub token_hash: Option<String>,

    pub token_rotated_at: Option<DateTime<Utc>>,
    pub request_timeout_secs: i32,

    /// Page size for `GET /Users`.
    pub page_size: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new directory target.
#[derive(Debug)]
pub struct CreateDirectoryTarget {
    pub tenant_id: Uuid,
    pub base_url: String,
    pub request_timeout_secs: i32,
    pub page_size: i32,
}

impl DirectoryTarget {
    /// Create a new directory target record.
    pub async fn create<'e, E>(executor: E, data: &CreateDirectoryTarget) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as(
            r#"
            INSERT INTO directory_targets (tenant_id, base_url, request_timeout_secs, page_size)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(&data.base_url)
        .bind(data.request_timeout_secs)
        .bind(data.page_size)
        .fetch_one(executor)
        .await
    }

    /// Find a directory target by ID within a specific tenant.
    pub async fn get_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM directory_targets
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Store the hash of a freshly generated bearer token.
    /// Returns true if a row was updated.
    pub async fn rotate_token(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        token_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE directory_targets
            SET token_hash = $3,
                token_rotated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(token_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
