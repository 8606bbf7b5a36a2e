//! Microsoft Entra ID adapter (Microsoft Graph).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use dirsync_core::CanonicalUser;

use crate::error::ConnectorResult;
use crate::oauth2::ProviderSettings;
use crate::provider::{apply_exclusions, UserProvider};
use crate::transport::AuthorizedClient;

pub const DEFAULT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const USER_SELECT: &str = "id,userPrincipalName,displayName,givenName,surname,accountEnabled";
const PAGE_SIZE: u32 = 999;

/// Response wrapper for paginated Graph API responses.
#[derive(Debug, Deserialize)]
struct ODataResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// A Graph `user` restricted to the selected attributes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntraUser {
    #[serde(default)]
    pub user_principal_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub account_enabled: Option<bool>,
}

impl EntraUser {
    /// Map into the canonical shape. A missing `accountEnabled` counts as
    /// enabled.
    #[must_use]
    pub fn into_canonical(self) -> CanonicalUser {
        let given = self.given_name.unwrap_or_default();
        let family = self.surname.unwrap_or_default();
        let display_name = match self.display_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => format!("{given} {family}").trim().to_string(),
        };
        CanonicalUser::new(
            self.user_principal_name,
            display_name,
            self.account_enabled.unwrap_or(true),
        )
        .with_name(given, family)
    }
}

/// Lists users of an Entra ID tenant.
#[derive(Debug)]
pub struct EntraProvider {
    client: AuthorizedClient,
    base_url: String,
    excluded: Vec<String>,
}

impl EntraProvider {
    #[must_use]
    pub fn new(client: AuthorizedClient, settings: &ProviderSettings) -> Self {
        Self {
            client,
            base_url: settings
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE.to_string()),
            excluded: settings.excluded_usernames.clone(),
        }
    }

    fn first_page_url(&self) -> ConnectorResult<Url> {
        let mut url = Url::parse(&format!("{}/users", self.base_url.trim_end_matches('/')))?;
        url.query_pairs_mut()
            .append_pair("$select", USER_SELECT)
            .append_pair("$top", &PAGE_SIZE.to_string());
        Ok(url)
    }
}

#[async_trait]
impl UserProvider for EntraProvider {
    fn name(&self) -> &'static str {
        "microsoft_entra"
    }

    #[instrument(skip(self))]
    async fn list_users(&self) -> ConnectorResult<Vec<CanonicalUser>> {
        let mut users = Vec::new();
        let mut next_url = Some(self.first_page_url()?.to_string());
        let mut pages = 0u32;

        while let Some(url) = next_url {
            let page: ODataResponse<EntraUser> = self.client.get_json(&url).await?;
            pages += 1;
            debug!(page = pages, fetched = page.value.len(), "Fetched Graph users page");

            users.extend(page.value.into_iter().map(EntraUser::into_canonical));
            next_url = page.next_link;
        }

        let users = apply_exclusions(users, &self.excluded);
        info!(count = users.len(), pages, "Listed Entra users");
        Ok(users)
    }
}
