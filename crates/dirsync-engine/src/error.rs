//! Sync error types.

use std::time::Duration;

use thiserror::Error;

use dirsync_connector::ConnectorError;
use dirsync_core::SyncStats;
use dirsync_db::DbError;
use dirsync_scim_client::ScimClientError;

use crate::reconcile::ReconcileError;

/// Errors that end a sync attempt.
///
/// Every variant flows through the same failure transition; the message is
/// what operators see in `sync_error`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Provider error: {0}")]
    Provider(#[from] ConnectorError),

    #[error("Directory error: {0}")]
    Directory(#[from] ScimClientError),

    /// Bridge configuration cannot be used as-is.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Some directory mutations failed; the rest were applied.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("sync timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("sync cancelled by shutdown")]
    Cancelled,

    #[error("sync panicked: {message}")]
    Panicked { message: String },
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(DbError::from(e))
    }
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Failures that will repeat until an operator fixes the bridge.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::Configuration { .. } => true,
            Self::Provider(e) => e.is_config_error(),
            _ => false,
        }
    }

    /// Counters from a pass that ran but partially failed.
    #[must_use]
    pub fn partial_stats(&self) -> Option<SyncStats> {
        match self {
            Self::Reconcile(e) => Some(e.stats),
            _ => None,
        }
    }
}
