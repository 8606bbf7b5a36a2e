//! Connection pool wrapper.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// Thin wrapper around [`PgPool`] with the settings the worker uses.
#[derive(Debug, Clone)]
pub struct DbPool {
    inner: PgPool,
}

impl DbPool {
    /// Connect to PostgreSQL.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if the pool cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        let inner = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;

        tracing::info!(max_connections, "Database pool connected");
        Ok(Self { inner })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(inner: PgPool) -> Self {
        Self { inner }
    }

    /// Borrow the underlying `sqlx` pool.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.inner
    }
}
