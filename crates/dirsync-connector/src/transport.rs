//! Authenticated HTTP transport shared by provider adapters.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{instrument, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::oauth2::TokenSource;

/// A `reqwest::Client` that injects a bearer token from a [`TokenSource`].
///
/// A 401 invalidates the token and retries the request once.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    http_client: reqwest::Client,
    tokens: Arc<TokenSource>,
}

impl AuthorizedClient {
    /// Creates a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(tokens: Arc<TokenSource>, timeout: Duration) -> ConnectorResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_http_client(http_client, tokens))
    }

    #[must_use]
    pub fn with_http_client(http_client: reqwest::Client, tokens: Arc<TokenSource>) -> Self {
        Self {
            http_client,
            tokens,
        }
    }

    #[must_use]
    pub fn token_source(&self) -> &Arc<TokenSource> {
        &self.tokens
    }

    /// GET a URL and decode the JSON body.
    #[instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ConnectorResult<T> {
        let mut response = self.send_get(url).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Provider rejected access token, refreshing and retrying once");
            self.tokens.invalidate().await;
            response = self.send_get(url).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_get(&self, url: &str) -> ConnectorResult<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        Ok(self
            .http_client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?)
    }
}
