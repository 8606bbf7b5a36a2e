//! Directory sync engine.
//!
//! A [`BridgeRunner`] polls storage for due bridges, claims one at a time,
//! hands it to a [`BridgeSyncer`] and records the outcome. The production
//! [`DirectorySyncer`] lists users from an identity provider and a SCIM
//! directory and applies the difference with [`reconcile`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dirsync_connector::CredentialEncryption;
//! use dirsync_engine::{BridgeRunner, DirectorySyncer, PgBridgeStore, RunnerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunnerConfig::default();
//! let store = Arc::new(PgBridgeStore::new(pool));
//! let encryption = CredentialEncryption::from_hex(&"00".repeat(32))?;
//! let syncer = Arc::new(DirectorySyncer::new(store.clone(), encryption, &config));
//! let runner = BridgeRunner::new(store, syncer, config)?;
//! runner.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod runner;
pub mod store;
pub mod syncer;

pub use backoff::{BackoffPolicy, FailureTransition};
pub use config::RunnerConfig;
pub use error::SyncError;
pub use reconcile::{reconcile, MutationFailure, ReconcileError, ReconcileOptions, ReconcileReport};
pub use runner::{BridgeRunner, TickOutcome};
pub use store::{BridgeStore, PgBridgeStore, RefreshedCredential};
pub use syncer::{BridgeSyncer, DirectorySyncer, SyncOutcome};
