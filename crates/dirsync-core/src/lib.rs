//! dirsync Core Library
//!
//! Shared types used on both sides of a directory sync.
//!
//! # Modules
//!
//! - [`user`] - The canonical user shape compared between provider and directory
//! - [`stats`] - Per-pass reconciliation counters
//!
//! # Example
//!
//! ```
//! use dirsync_core::{CanonicalUser, SyncStats};
//!
//! let user = CanonicalUser::new("a@example.com", "Ada Lovelace", true);
//! assert_eq!(user.join_key(), "a@example.com");
//!
//! let mut stats = SyncStats::default();
//! stats.created += 1;
//! assert_eq!(stats.mutations(), 1);
//! ```

pub mod stats;
pub mod user;

pub use stats::SyncStats;
pub use user::{normalize_username, CanonicalUser, DirectoryUser};
