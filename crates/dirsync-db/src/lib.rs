//! dirsync database layer.
//!
//! Models and queries for directory-sync bridges, the provider credentials
//! they authenticate with, and the SCIM directories they push into.
//!
//! Every query is tenant-scoped except the claim query, which scans all
//! tenants for due work.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
