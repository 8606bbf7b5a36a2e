//! SCIM 2.0 HTTP client (reqwest-based).
//!
//! Talks to the target directory's `/Users` endpoint. Every call goes through
//! the client's [`RetryPolicy`] so transient failures (429, gateway errors,
//! connection problems) are retried before surfacing.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::auth::ScimAuth;
use crate::error::{ScimClientError, ScimClientResult};
use crate::models::{PatchRequest, ScimListResponse, ScimUser};
use crate::retry::RetryPolicy;
use dirsync_core::{CanonicalUser, DirectoryUser};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

const SCIM_CONTENT_TYPE: &str = "application/scim+json";

/// Every user in the directory plus the `totalResults` it reported.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    pub users: Vec<DirectoryUser>,
    pub total_results: i64,
}

/// SCIM 2.0 client for the sync target.
#[derive(Debug, Clone)]
pub struct ScimClient {
    /// Base URL without trailing slash (e.g. `https://dir.example.com/scim/v2`).
    base_url: String,
    auth: ScimAuth,
    http_client: Client,
    page_size: u32,
    retry: RetryPolicy,
}

impl ScimClient {
    /// Create a client with the given request timeout.
    pub fn new(base_url: &str, auth: ScimAuth, timeout: Duration) -> ScimClientResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dirsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ScimClientError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self::with_http_client(base_url, auth, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    #[must_use]
    pub fn with_http_client(base_url: &str, auth: ScimAuth, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http_client,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Page size for `list_all_users`. Zero falls back to the default.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    // ── User Operations ───────────────────────────────────────────────

    /// Fetch every user, paging with `startIndex`/`count`.
    ///
    /// Stops once `totalResults` users have been collected or a page comes
    /// back empty.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn list_all_users(&self) -> ScimClientResult<DirectoryListing> {
        let mut users = Vec::new();
        let mut start_index: i64 = 1;
        let mut total_results: i64;
        let mut collected: i64 = 0;

        loop {
            let page = self.list_users_page(start_index, self.page_size).await?;
            total_results = page.total_results;

            let fetched = page.resources.len() as i64;
            if fetched == 0 {
                break;
            }
            collected += fetched;
            start_index += fetched;

            for resource in page.resources {
                let user_name = resource.user_name.clone();
                match resource.into_directory_user() {
                    Some(user) => users.push(user),
                    None => warn!(user_name = %user_name, "Directory returned a user without an id"),
                }
            }

            if collected >= total_results {
                break;
            }
        }

        debug!(count = users.len(), total_results, "Listed directory users");
        Ok(DirectoryListing {
            users,
            total_results,
        })
    }

    /// Fetch one page of users (GET /Users).
    pub async fn list_users_page(
        &self,
        start_index: i64,
        count: u32,
    ) -> ScimClientResult<ScimListResponse> {
        let url = format!("{}/Users", self.base_url);
        let query = [
            ("startIndex", start_index.to_string()),
            ("count", count.to_string()),
        ];
        let (url, query) = (url.as_str(), &query);
        self.retry
            .execute("list_users", move || async move {
                debug!("SCIM GET {} (startIndex={})", url, start_index);
                let builder = self.auth.apply(self.http_client.get(url).query(query));
                let response = builder.send().await?;
                self.handle_response(response).await
            })
            .await
    }

    /// Create a user (POST /Users).
    ///
    /// Any 2xx is success. The created resource is returned when the
    /// directory echoed one back.
    pub async fn create_user(&self, user: &CanonicalUser) -> ScimClientResult<Option<ScimUser>> {
        let url = format!("{}/Users", self.base_url);
        let payload = ScimUser::from_canonical(user);
        self.send_json("create_user", reqwest::Method::POST, &url, &payload)
            .await
    }

    /// Replace a user with the full payload (PUT /Users/:id).
    pub async fn replace_user(
        &self,
        id: &str,
        user: &CanonicalUser,
    ) -> ScimClientResult<Option<ScimUser>> {
        let url = format!("{}/Users/{}", self.base_url, id);
        let payload = ScimUser::from_canonical(user);
        self.send_json("replace_user", reqwest::Method::PUT, &url, &payload)
            .await
    }

    /// Deactivate a user by setting active=false (PATCH /Users/:id).
    pub async fn deactivate_user(&self, id: &str) -> ScimClientResult<()> {
        let url = format!("{}/Users/{}", self.base_url, id);
        let patch = PatchRequest::deactivate();
        let (url, patch) = (url.as_str(), &patch);
        self.retry
            .execute("deactivate_user", move || async move {
                debug!("SCIM PATCH {}", url);
                let builder = self.auth.apply(self.http_client.patch(url));
                let response = builder
                    .header("Content-Type", SCIM_CONTENT_TYPE)
                    .json(patch)
                    .send()
                    .await?;
                self.handle_empty_response(response, false).await
            })
            .await
    }

    /// Delete a user (DELETE /Users/:id). A missing user counts as deleted.
    pub async fn delete_user(&self, id: &str) -> ScimClientResult<()> {
        let url = format!("{}/Users/{}", self.base_url, id);
        let url = url.as_str();
        self.retry
            .execute("delete_user", move || async move {
                debug!("SCIM DELETE {}", url);
                let response = self.auth.apply(self.http_client.delete(url)).send().await?;
                self.handle_empty_response(response, true).await
            })
            .await
    }

    // ── Internal HTTP Methods ─────────────────────────────────────────

    async fn send_json<B: Serialize>(
        &self,
        operation: &str,
        method: reqwest::Method,
        url: &str,
        body: &B,
    ) -> ScimClientResult<Option<ScimUser>> {
        let method = &method;
        self.retry
            .execute(operation, move || async move {
                debug!("SCIM {} {}", method, url);
                let builder = self.auth.apply(self.http_client.request(method.clone(), url));
                let response = builder
                    .header("Content-Type", SCIM_CONTENT_TYPE)
                    .json(body)
                    .send()
                    .await?;
                self.handle_resource_response(response).await
            })
            .await
    }

    // ── Response Handling ─────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ScimClientResult<T> {
        if response.status().is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| ScimClientError::ParseError(format!("Failed to parse response: {e}")))
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    /// The write has been applied once the status is 2xx, so an empty,
    /// unreadable or non-User body is not an error.
    async fn handle_resource_response(
        &self,
        response: reqwest::Response,
    ) -> ScimClientResult<Option<ScimUser>> {
        let status = response.status();
        if !status.is_success() {
            return Err(self.error_from_response(response).await);
        }
        let Ok(body) = response.text().await else {
            debug!(%status, "SCIM response body unreadable; ignoring");
            return Ok(None);
        };
        if body.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str(&body) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                debug!(%status, error = %e, "SCIM response body is not a User resource; ignoring");
                Ok(None)
            }
        }
    }

    async fn handle_empty_response(
        &self,
        response: reqwest::Response,
        not_found_ok: bool,
    ) -> ScimClientResult<()> {
        let status = response.status();
        if status.is_success() || (not_found_ok && status == StatusCode::NOT_FOUND) {
            Ok(())
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    async fn error_from_response(&self, response: reqwest::Response) -> ScimClientError {
        let status = response.status();

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());

        match status {
            StatusCode::NOT_FOUND => ScimClientError::NotFound(body),
            StatusCode::CONFLICT => ScimClientError::Conflict(body),
            StatusCode::UNAUTHORIZED => ScimClientError::AuthError(body),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Directory rate limited, retry after {:?}s", retry_after);
                ScimClientError::RateLimited {
                    retry_after_secs: retry_after,
                    body,
                }
            }
            _ => {
                let detail = if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                };
                ScimClientError::ScimError {
                    status: status.as_u16(),
                    detail,
                }
            }
        }
    }
}
