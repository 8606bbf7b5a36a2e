//! Identity provider adapters for directory sync.
//!
//! Each adapter implements [`UserProvider`] over an [`AuthorizedClient`],
//! which injects `OAuth2` access tokens from a [`TokenSource`]. Provider
//! credentials are stored encrypted with [`CredentialEncryption`].

pub mod crypto;
pub mod entra;
pub mod error;
pub mod google;
pub mod oauth2;
pub mod provider;
pub mod transport;

pub use crypto::CredentialEncryption;
pub use entra::EntraProvider;
pub use error::{ConnectorError, ConnectorResult};
pub use google::GoogleWorkspaceProvider;
pub use oauth2::{OAuth2Token, ProviderCredentials, ProviderSettings, TokenSource};
pub use provider::{apply_exclusions, ProviderKind, UserProvider};
pub use transport::AuthorizedClient;
