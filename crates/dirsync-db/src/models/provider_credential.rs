//! Provider credential model.
//!
//! Holds the encrypted OAuth2 client and token material a bridge uses to
//! read from its upstream identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

/// An encrypted provider credential record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProviderCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Provider the credential was issued by (e.g. "google_workspace").
    pub provider: String,

    /// Encrypted credential payload. Never exposed in API responses.
    #[serde(skip_serializing)]
    pub credentials_encrypted: Vec<u8>,

    /// Key version used to encrypt credentials.
    pub credentials_key_version: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new provider credential.
#[derive(Debug)]
pub struct CreateProviderCredential {
    pub tenant_id: Uuid,
    pub provider: String,
    pub credentials_encrypted: Vec<u8>,
    pub credentials_key_version: i32,
}

impl ProviderCredential {
    /// Create a new provider credential record.
    pub async fn create<'e, E>(
        executor: E,
        data: &CreateProviderCredential,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as(
            r#"
            INSERT INTO provider_credentials
                (tenant_id, provider, credentials_encrypted, credentials_key_version)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(&data.provider)
        .bind(&data.credentials_encrypted)
        .bind(data.credentials_key_version)
        .fetch_one(executor)
        .await
    }

    /// Find a credential by ID within a specific tenant.
    pub async fn get_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM provider_credentials
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Replace the encrypted payload, e.g. after an OAuth2 token refresh.
    /// Returns true if a row was updated.
    pub async fn update_credentials<'e, E>(
        executor: E,
        tenant_id: Uuid,
        id: Uuid,
        credentials_encrypted: &[u8],
        credentials_key_version: i32,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE provider_credentials
            SET credentials_encrypted = $3,
                credentials_key_version = $4,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(credentials_encrypted)
        .bind(credentials_key_version)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
