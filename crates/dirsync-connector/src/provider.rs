//! Identity provider adapter contract.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use dirsync_core::{normalize_username, CanonicalUser};

use crate::entra::EntraProvider;
use crate::error::{ConnectorError, ConnectorResult};
use crate::google::GoogleWorkspaceProvider;
use crate::oauth2::ProviderSettings;
use crate::transport::AuthorizedClient;

/// An upstream source of users.
///
/// Implementations page through their source, map each record into a
/// [`CanonicalUser`] and drop adapter-level exclusions before returning.
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Return the complete current user list.
    async fn list_users(&self) -> ConnectorResult<Vec<CanonicalUser>>;
}

/// Provider kind tag stored on a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GoogleWorkspace,
    MicrosoftEntra,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleWorkspace => "google_workspace",
            Self::MicrosoftEntra => "microsoft_entra",
        }
    }

    /// Build the adapter for this kind over an authenticated transport.
    #[must_use]
    pub fn build(
        self,
        client: AuthorizedClient,
        settings: &ProviderSettings,
    ) -> Box<dyn UserProvider> {
        match self {
            Self::GoogleWorkspace => Box::new(GoogleWorkspaceProvider::new(client, settings)),
            Self::MicrosoftEntra => Box::new(EntraProvider::new(client, settings)),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_workspace" => Ok(Self::GoogleWorkspace),
            "microsoft_entra" => Ok(Self::MicrosoftEntra),
            other => Err(ConnectorError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop users whose username matches an excluded name, ignoring case.
#[must_use]
pub fn apply_exclusions(users: Vec<CanonicalUser>, excluded: &[String]) -> Vec<CanonicalUser> {
    if excluded.is_empty() {
        return users;
    }
    let excluded: HashSet<String> = excluded.iter().map(|u| normalize_username(u)).collect();
    users
        .into_iter()
        .filter(|user| !excluded.contains(&user.join_key()))
        .collect()
}
