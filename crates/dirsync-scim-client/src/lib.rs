//! SCIM 2.0 client for the directory side of a sync bridge.
//!
//! [`ScimClient`] lists and mutates `/Users` on the target directory and
//! implements [`UserDirectory`], the seam the reconciler writes through.
//! Bearer tokens are minted per pass with [`generate_directory_token`].

pub mod auth;
pub mod client;
pub mod directory;
pub mod error;
pub mod models;
pub mod retry;
pub mod token;

pub use auth::ScimAuth;
pub use client::{DirectoryListing, ScimClient, DEFAULT_PAGE_SIZE};
pub use directory::UserDirectory;
pub use error::{ScimClientError, ScimClientResult};
pub use retry::RetryPolicy;
pub use token::{generate_directory_token, hash_token, DirectoryToken};
