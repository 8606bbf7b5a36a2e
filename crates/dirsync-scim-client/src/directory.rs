//! The directory seam the reconciler writes through.

use async_trait::async_trait;

use crate::client::ScimClient;
use crate::error::ScimClientResult;
use dirsync_core::CanonicalUser;

/// Mutations the reconciler applies to a directory, keyed by the
/// directory's own opaque user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn create_user(&self, user: &CanonicalUser) -> ScimClientResult<()>;

    /// Replace the user with the full canonical payload.
    async fn update_user(&self, id: &str, user: &CanonicalUser) -> ScimClientResult<()>;

    async fn deactivate_user(&self, id: &str) -> ScimClientResult<()>;

    async fn delete_user(&self, id: &str) -> ScimClientResult<()>;
}

#[async_trait]
impl UserDirectory for ScimClient {
    async fn create_user(&self, user: &CanonicalUser) -> ScimClientResult<()> {
        ScimClient::create_user(self, user).await.map(drop)
    }

    async fn update_user(&self, id: &str, user: &CanonicalUser) -> ScimClientResult<()> {
        self.replace_user(id, user).await.map(drop)
    }

    async fn deactivate_user(&self, id: &str) -> ScimClientResult<()> {
        ScimClient::deactivate_user(self, id).await
    }

    async fn delete_user(&self, id: &str) -> ScimClientResult<()> {
        ScimClient::delete_user(self, id).await
    }
}
