//! Diff-based reconciliation of provider users into a directory.
//!
//! A pass takes two complete snapshots, joins them on the lower-cased
//! username and applies creates, updates, deactivations and deletes through
//! a [`UserDirectory`]. Each mutation is fault-isolated: a failure is
//! recorded and the pass moves on.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use dirsync_core::{normalize_username, CanonicalUser, DirectoryUser, SyncStats};
use dirsync_scim_client::UserDirectory;

/// Per-pass knobs.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Count mutations without calling the directory.
    pub dry_run: bool,

    /// Update every matched user even when nothing changed.
    pub force_update: bool,

    /// Directory usernames that are deleted, not deactivated, once they
    /// disappear from the provider.
    pub excluded_usernames: Vec<String>,
}

/// Directory mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    Deactivate,
    Delete,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Deactivate => "deactivate",
            Self::Delete => "delete",
        })
    }
}

/// One failed directory mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFailure {
    pub mutation: Mutation,
    pub username: String,
    pub message: String,
}

impl fmt::Display for MutationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.mutation, self.username, self.message)
    }
}

/// Aggregate of every mutation that failed during a pass.
///
/// `stats` still counts the mutations that succeeded.
#[derive(Debug, Clone, Error)]
#[error("{} directory mutation(s) failed: {}", failures.len(), join_failures(failures))]
pub struct ReconcileError {
    pub stats: SyncStats,
    pub failures: Vec<MutationFailure>,
}

fn join_failures(failures: &[MutationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of a pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub stats: SyncStats,
    pub failures: Vec<MutationFailure>,
}

impl ReconcileReport {
    /// Fold the collected failures into a single error.
    pub fn into_result(self) -> Result<SyncStats, ReconcileError> {
        if self.failures.is_empty() {
            Ok(self.stats)
        } else {
            Err(ReconcileError {
                stats: self.stats,
                failures: self.failures,
            })
        }
    }

    fn record(&mut self, mutation: Mutation, username: &str, error: impl fmt::Display) {
        warn!(
            mutation = %mutation,
            username = %username,
            error = %error,
            "Directory mutation failed"
        );
        self.failures.push(MutationFailure {
            mutation,
            username: username.to_string(),
            message: error.to_string(),
        });
    }
}

/// True when a matched directory user differs from the provider's view.
fn needs_update(provider: &CanonicalUser, existing: &CanonicalUser) -> bool {
    provider.active != existing.active || provider.display_name != existing.display_name
}

/// Apply one reconciliation pass.
///
/// Directory users left unseen are deleted if excluded, left alone if
/// already inactive, and deactivated otherwise.
pub async fn reconcile(
    directory: &dyn UserDirectory,
    provider_users: &[CanonicalUser],
    directory_users: &[DirectoryUser],
    options: &ReconcileOptions,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let index: HashMap<String, &DirectoryUser> = directory_users
        .iter()
        .map(|u| (u.user.join_key(), u))
        .collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(provider_users.len());

    for user in provider_users {
        let key = user.join_key();
        if key.is_empty() {
            warn!(display_name = %user.display_name, "Skipping provider user without username");
            report.stats.skipped += 1;
            continue;
        }
        if !seen.insert(key.clone()) {
            debug!(username = %user.username, "Skipping duplicate provider username");
            report.stats.skipped += 1;
            continue;
        }

        match index.get(&key) {
            None => {
                debug!(username = %user.username, dry_run = options.dry_run, "Creating user");
                let result = if options.dry_run {
                    Ok(())
                } else {
                    directory.create_user(user).await
                };
                match result {
                    Ok(()) => report.stats.created += 1,
                    Err(e) => report.record(Mutation::Create, &user.username, e),
                }
            }
            Some(existing) if options.force_update || needs_update(user, &existing.user) => {
                debug!(
                    username = %user.username,
                    directory_id = %existing.id,
                    dry_run = options.dry_run,
                    "Updating user"
                );
                let result = if options.dry_run {
                    Ok(())
                } else {
                    directory.update_user(&existing.id, user).await
                };
                match result {
                    Ok(()) => report.stats.updated += 1,
                    Err(e) => report.record(Mutation::Update, &user.username, e),
                }
            }
            Some(_) => report.stats.skipped += 1,
        }
    }

    let excluded: HashSet<String> = options
        .excluded_usernames
        .iter()
        .map(|u| normalize_username(u))
        .collect();

    for existing in directory_users {
        let key = existing.user.join_key();
        if seen.contains(&key) {
            continue;
        }

        if excluded.contains(&key) {
            debug!(username = %existing.user.username, directory_id = %existing.id, "Deleting excluded user");
            let result = if options.dry_run {
                Ok(())
            } else {
                directory.delete_user(&existing.id).await
            };
            match result {
                Ok(()) => report.stats.deleted += 1,
                Err(e) => report.record(Mutation::Delete, &existing.user.username, e),
            }
        } else if existing.user.active {
            debug!(username = %existing.user.username, directory_id = %existing.id, "Deactivating user");
            let result = if options.dry_run {
                Ok(())
            } else {
                directory.deactivate_user(&existing.id).await
            };
            match result {
                Ok(()) => report.stats.deactivated += 1,
                Err(e) => report.record(Mutation::Deactivate, &existing.user.username, e),
            }
        }
    }

    info!(
        created = report.stats.created,
        updated = report.stats.updated,
        deleted = report.stats.deleted,
        deactivated = report.stats.deactivated,
        skipped = report.stats.skipped,
        failures = report.failures.len(),
        dry_run = options.dry_run,
        "Reconciliation pass finished"
    );

    report
}
