//! Canonical user shape.
//!
//! Provider adapters and the directory client both translate their wire
//! formats into [`CanonicalUser`]. The username is the join key between the
//! two sides and is compared case-insensitively.

use serde::{Deserialize, Serialize};

/// Lower-case a username for use as a join key.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// A user as seen by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUser {
    /// Unique, case-insensitive key (usually the primary email).
    pub username: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Given (first) name.
    pub given_name: String,
    /// Family (last) name.
    pub family_name: String,
    /// Whether the account is enabled.
    pub active: bool,
}

impl CanonicalUser {
    /// Create a user with empty name parts.
    #[must_use]
    pub fn new(username: impl Into<String>, display_name: impl Into<String>, active: bool) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
            given_name: String::new(),
            family_name: String::new(),
            active,
        }
    }

    /// Set the given and family name.
    #[must_use]
    pub fn with_name(mut self, given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        self.given_name = given_name.into();
        self.family_name = family_name.into();
        self
    }

    /// The lower-cased username used to join provider and directory records.
    #[must_use]
    pub fn join_key(&self) -> String {
        normalize_username(&self.username)
    }
}

/// A user that exists in the target directory.
///
/// `id` is the directory's own opaque identifier, distinct from the username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    #[serde(flatten)]
    pub user: CanonicalUser,
}

impl DirectoryUser {
    #[must_use]
    pub fn new(id: impl Into<String>, user: CanonicalUser) -> Self {
        Self {
            id: id.into(),
            user,
        }
    }
}
