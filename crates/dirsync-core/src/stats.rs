//! Reconciliation pass counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counts of what one reconciliation pass did to the directory.
///
/// Counters only reflect operations that succeeded (or would have, in a
/// dry run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub deactivated: u32,
    pub skipped: u32,
}

impl SyncStats {
    /// Number of directory mutations performed.
    #[must_use]
    pub fn mutations(&self) -> u32 {
        self.created + self.updated + self.deleted + self.deactivated
    }

    /// True when the pass changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.mutations() == 0
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} deleted={} deactivated={} skipped={}",
            self.created, self.updated, self.deleted, self.deactivated, self.skipped
        )
    }
}
