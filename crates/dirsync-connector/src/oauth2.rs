//! `OAuth2` refresh-token handling for provider APIs.
//!
//! Provider credentials carry a long-lived refresh token next to the current
//! access token. [`TokenSource`] hands out the access token while it is
//! valid and exchanges the refresh token when it is not, remembering that it
//! did so the sync can persist the new token afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{ConnectorError, ConnectorResult};

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// An `OAuth2` access token with its optional refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// `None` means the provider did not report an expiry.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuth2Token {
    /// True if the token is expired or expires within `grace`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.expires_at.is_some_and(|expires_at| now + grace >= expires_at)
    }
}

impl std::fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Token")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Adapter-specific settings stored alongside the credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Google Workspace customer ID (`my_customer` when neither this nor
    /// `domain` is set).
    #[serde(default)]
    pub customer: Option<String>,
    /// Google Workspace domain filter.
    #[serde(default)]
    pub domain: Option<String>,
    /// Override for the provider API base URL.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Usernames the adapter drops before returning users.
    #[serde(default)]
    pub excluded_usernames: Vec<String>,
}

/// Decrypted contents of a provider credential row.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
    pub token: OAuth2Token,
    #[serde(default)]
    pub settings: ProviderSettings,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_endpoint", &self.token_endpoint)
            .field("token", &self.token)
            .field("settings", &self.settings)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug)]
struct TokenState {
    token: OAuth2Token,
    invalidated: bool,
    refreshed: bool,
}

/// Supplies access tokens, refreshing them on demand.
pub struct TokenSource {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_endpoint: String,
    grace_period: Duration,
    state: Mutex<TokenState>,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSource")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_endpoint", &self.token_endpoint)
            .finish_non_exhaustive()
    }
}

impl TokenSource {
    /// Creates a token source from decrypted credentials. `timeout` bounds
    /// each token endpoint request.
    pub fn new(
        credentials: &ProviderCredentials,
        timeout: std::time::Duration,
    ) -> ConnectorResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_http_client(http_client, credentials))
    }

    #[must_use]
    pub fn with_http_client(http_client: reqwest::Client, credentials: &ProviderCredentials) -> Self {
        Self {
            http_client,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            token_endpoint: credentials.token_endpoint.clone(),
            grace_period: Duration::seconds(60),
            state: Mutex::new(TokenState {
                token: credentials.token.clone(),
                invalidated: false,
                refreshed: false,
            }),
        }
    }

    /// Returns a valid access token, refreshing if necessary.
    ///
    /// Concurrent callers wait on the same refresh.
    pub async fn access_token(&self) -> ConnectorResult<String> {
        let mut state = self.state.lock().await;
        if !state.invalidated && !state.token.is_expired(Utc::now(), self.grace_period) {
            return Ok(state.token.access_token.clone());
        }

        let refresh_token = state
            .token
            .refresh_token
            .clone()
            .ok_or(ConnectorError::CredentialsExpired)?;

        debug!("Refreshing provider access token");
        let response = self.exchange_refresh_token(&refresh_token).await?;

        state.token = OAuth2Token {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(Some(refresh_token)),
            token_type: response.token_type.unwrap_or_else(default_token_type),
            expires_at: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        };
        state.invalidated = false;
        state.refreshed = true;

        Ok(state.token.access_token.clone())
    }

    /// Forces a refresh on next use.
    pub async fn invalidate(&self) {
        self.state.lock().await.invalidated = true;
    }

    /// The current token if it was refreshed since this source was built.
    pub async fn refreshed_token(&self) -> Option<OAuth2Token> {
        let state = self.state.lock().await;
        state.refreshed.then(|| state.token.clone())
    }

    #[instrument(skip(self, refresh_token), fields(endpoint = %self.token_endpoint))]
    async fn exchange_refresh_token(&self, refresh_token: &str) -> ConnectorResult<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| ConnectorError::Auth(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) {
                if error.error == "invalid_grant" {
                    warn!(
                        description = error.error_description.as_deref().unwrap_or_default(),
                        "Refresh token rejected by provider"
                    );
                    return Err(ConnectorError::CredentialsExpired);
                }
            }
            return Err(ConnectorError::Auth(format!(
                "Token request failed with status {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ConnectorError::Auth(format!("Failed to parse token response: {e}")))
    }
}
