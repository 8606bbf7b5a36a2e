//! Google Workspace adapter (Admin SDK Directory API).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use dirsync_core::CanonicalUser;

use crate::error::ConnectorResult;
use crate::oauth2::ProviderSettings;
use crate::provider::{apply_exclusions, UserProvider};
use crate::transport::AuthorizedClient;

pub const DEFAULT_GOOGLE_API_BASE: &str = "https://admin.googleapis.com";

/// Largest page the Directory API serves.
const MAX_RESULTS: u32 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersPage {
    #[serde(default)]
    users: Vec<GoogleUser>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleName {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

/// A `users` resource as returned by `users.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUser {
    #[serde(default)]
    pub primary_email: String,
    #[serde(default)]
    pub name: GoogleName,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub archived: bool,
}

impl GoogleUser {
    /// Map into the canonical shape. Suspended or archived accounts are
    /// inactive.
    #[must_use]
    pub fn into_canonical(self) -> CanonicalUser {
        let given = self.name.given_name.unwrap_or_default();
        let family = self.name.family_name.unwrap_or_default();
        let display_name = match self.name.full_name {
            Some(full) if !full.trim().is_empty() => full,
            _ => format!("{given} {family}").trim().to_string(),
        };
        CanonicalUser::new(
            self.primary_email,
            display_name,
            !self.suspended && !self.archived,
        )
        .with_name(given, family)
    }
}

#[derive(Debug, Clone)]
enum Scope {
    Customer(String),
    Domain(String),
}

/// Lists users of a Google Workspace customer or domain.
#[derive(Debug)]
pub struct GoogleWorkspaceProvider {
    client: AuthorizedClient,
    base_url: String,
    scope: Scope,
    excluded: Vec<String>,
}

impl GoogleWorkspaceProvider {
    #[must_use]
    pub fn new(client: AuthorizedClient, settings: &ProviderSettings) -> Self {
        let scope = match (&settings.domain, &settings.customer) {
            (Some(domain), _) => Scope::Domain(domain.clone()),
            (None, Some(customer)) => Scope::Customer(customer.clone()),
            (None, None) => Scope::Customer("my_customer".to_string()),
        };
        Self {
            client,
            base_url: settings
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GOOGLE_API_BASE.to_string()),
            scope,
            excluded: settings.excluded_usernames.clone(),
        }
    }

    fn page_url(&self, page_token: Option<&str>) -> ConnectorResult<Url> {
        let mut url = Url::parse(&format!(
            "{}/admin/directory/v1/users",
            self.base_url.trim_end_matches('/')
        ))?;
        {
            let mut query = url.query_pairs_mut();
            match &self.scope {
                Scope::Customer(customer) => query.append_pair("customer", customer),
                Scope::Domain(domain) => query.append_pair("domain", domain),
            };
            query
                .append_pair("maxResults", &MAX_RESULTS.to_string())
                .append_pair("projection", "basic");
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl UserProvider for GoogleWorkspaceProvider {
    fn name(&self) -> &'static str {
        "google_workspace"
    }

    #[instrument(skip(self))]
    async fn list_users(&self) -> ConnectorResult<Vec<CanonicalUser>> {
        let mut users = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let url = self.page_url(page_token.as_deref())?;
            let page: UsersPage = self.client.get_json(url.as_str()).await?;
            pages += 1;
            debug!(page = pages, fetched = page.users.len(), "Fetched Google Workspace users page");

            users.extend(page.users.into_iter().map(GoogleUser::into_canonical));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        let users = apply_exclusions(users, &self.excluded);
        info!(count = users.len(), pages, "Listed Google Workspace users");
        Ok(users)
    }
}
