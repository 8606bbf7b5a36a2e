//! One sync pass for one bridge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use dirsync_connector::{AuthorizedClient, CredentialEncryption, ProviderCredentials, ProviderKind, TokenSource};
use dirsync_core::SyncStats;
use dirsync_db::models::DirectoryBridge;
use dirsync_scim_client::{generate_directory_token, RetryPolicy, ScimAuth, ScimClient};

use crate::config::RunnerConfig;
use crate::error::SyncError;
use crate::reconcile::{reconcile, ReconcileOptions};
use crate::store::{BridgeStore, RefreshedCredential};

/// Request timeout for provider API calls.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// What a successful pass hands back to the runner.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub stats: SyncStats,
    /// Set when the provider token was refreshed during the pass.
    pub refreshed_credential: Option<RefreshedCredential>,
}

/// Runs a single reconciliation pass for a claimed bridge.
#[async_trait]
pub trait BridgeSyncer: Send + Sync {
    async fn sync(&self, bridge: &DirectoryBridge) -> Result<SyncOutcome, SyncError>;
}

/// Production syncer: provider adapter on one side, SCIM directory on the
/// other.
pub struct DirectorySyncer {
    store: Arc<dyn BridgeStore>,
    encryption: CredentialEncryption,
    dry_run: bool,
    default_page_size: u32,
    provider_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for DirectorySyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySyncer")
            .field("dry_run", &self.dry_run)
            .field("default_page_size", &self.default_page_size)
            .field("provider_timeout", &self.provider_timeout)
            .finish_non_exhaustive()
    }
}

impl DirectorySyncer {
    #[must_use]
    pub fn new(
        store: Arc<dyn BridgeStore>,
        encryption: CredentialEncryption,
        config: &RunnerConfig,
    ) -> Self {
        Self {
            store,
            encryption,
            dry_run: config.dry_run,
            default_page_size: config.directory_page_size,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Retry policy for directory calls.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }
}

#[async_trait]
impl BridgeSyncer for DirectorySyncer {
    #[instrument(skip(self, bridge), fields(bridge_id = %bridge.id, tenant_id = %bridge.tenant_id, kind = %bridge.kind))]
    async fn sync(&self, bridge: &DirectoryBridge) -> Result<SyncOutcome, SyncError> {
        let kind: ProviderKind = bridge.kind.parse()?;

        let credential_id = bridge
            .credential_id
            .ok_or_else(|| SyncError::configuration("bridge has no provider credential"))?;
        let directory_id = bridge
            .directory_id
            .ok_or_else(|| SyncError::configuration("bridge has no directory target"))?;

        let credential_row = self
            .store
            .load_credential(bridge.tenant_id, credential_id)
            .await?
            .ok_or_else(|| {
                SyncError::configuration(format!("provider credential {credential_id} not found"))
            })?;
        let directory = self
            .store
            .load_directory(bridge.tenant_id, directory_id)
            .await?
            .ok_or_else(|| {
                SyncError::configuration(format!("directory target {directory_id} not found"))
            })?;

        let credentials: ProviderCredentials = self
            .encryption
            .decrypt_json(bridge.tenant_id, &credential_row.credentials_encrypted)?;

        let tokens = Arc::new(TokenSource::new(&credentials, self.provider_timeout)?);
        let client = AuthorizedClient::new(Arc::clone(&tokens), self.provider_timeout)?;
        let provider = kind.build(client, &credentials.settings);

        let token = generate_directory_token();
        if !self
            .store
            .rotate_directory_token(bridge.tenant_id, directory.id, &token.hash)
            .await?
        {
            return Err(SyncError::configuration(format!(
                "directory target {directory_id} not found"
            )));
        }

        let page_size = u32::try_from(directory.page_size)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(self.default_page_size);
        let request_timeout = u64::try_from(directory.request_timeout_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map_or(DEFAULT_PROVIDER_TIMEOUT, Duration::from_secs);

        let scim = ScimClient::new(&directory.base_url, ScimAuth::bearer(token.raw), request_timeout)?
            .with_page_size(page_size)
            .with_retry_policy(self.retry_policy.clone());

        let (provider_users, listing) = tokio::try_join!(
            async { provider.list_users().await.map_err(SyncError::from) },
            async { scim.list_all_users().await.map_err(SyncError::from) },
        )?;
        debug!(
            provider = provider.name(),
            provider_users = provider_users.len(),
            directory_users = listing.users.len(),
            directory_total = listing.total_results,
            "Fetched both snapshots"
        );

        let options = ReconcileOptions {
            dry_run: self.dry_run,
            force_update: bridge.force_update,
            excluded_usernames: bridge.excluded_usernames.clone(),
        };
        let stats = reconcile(&scim, &provider_users, &listing.users, &options)
            .await
            .into_result()?;

        let refreshed_credential = match tokens.refreshed_token().await {
            Some(token) => {
                let updated = ProviderCredentials {
                    token,
                    ..credentials
                };
                match self.encryption.encrypt_json(bridge.tenant_id, &updated) {
                    Ok(credentials_encrypted) => Some(RefreshedCredential {
                        credential_id,
                        credentials_encrypted,
                        credentials_key_version: credential_row.credentials_key_version,
                    }),
                    Err(e) => {
                        warn!(error = %e, "Failed to re-encrypt refreshed provider credential");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(SyncOutcome {
            stats,
            refreshed_credential,
        })
    }
}
