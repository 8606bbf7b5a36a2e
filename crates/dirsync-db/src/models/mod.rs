//! Database models.

pub mod directory_bridge;
pub mod directory_target;
pub mod provider_credential;

pub use directory_bridge::{
    BridgeFailureUpdate, BridgeState, BridgeSuccessUpdate, CreateDirectoryBridge, DirectoryBridge,
};
pub use directory_target::{CreateDirectoryTarget, DirectoryTarget};
pub use provider_credential::{CreateProviderCredential, ProviderCredential};
