//! Common test utilities for dirsync-connector integration tests.

#![cfg(feature = "integration")]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};

use dirsync_connector::{
    AuthorizedClient, OAuth2Token, ProviderCredentials, ProviderSettings, TokenSource,
};

/// Credentials with a valid access token `valid-token`.
pub fn valid_credentials(token_endpoint: &str, settings: ProviderSettings) -> ProviderCredentials {
    ProviderCredentials {
        client_id: "test-client".into(),
        client_secret: "test-secret".into(),
        token_endpoint: token_endpoint.to_string(),
        token: OAuth2Token {
            access_token: "valid-token".into(),
            refresh_token: Some("refresh-token".into()),
            token_type: "Bearer".into(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        },
        settings,
    }
}

pub fn authorized_client(credentials: &ProviderCredentials) -> AuthorizedClient {
    let tokens = TokenSource::new(credentials, Duration::from_secs(5)).expect("token source");
    AuthorizedClient::new(Arc::new(tokens), Duration::from_secs(5)).expect("client")
}

pub fn settings_for(server_uri: &str) -> ProviderSettings {
    ProviderSettings {
        api_base_url: Some(server_uri.to_string()),
        ..Default::default()
    }
}

/// Test data factory for Google Workspace users.
pub fn google_user(email: &str, full_name: &str, suspended: bool) -> Value {
    json!({
        "kind": "admin#directory#user",
        "id": format!("id-{email}"),
        "primaryEmail": email,
        "name": {"fullName": full_name, "givenName": full_name, "familyName": "Test"},
        "suspended": suspended,
        "archived": false
    })
}

/// Test data factory for Graph users.
pub fn entra_user(upn: &str, display_name: &str, enabled: bool) -> Value {
    json!({
        "id": format!("id-{upn}"),
        "userPrincipalName": upn,
        "displayName": display_name,
        "givenName": display_name,
        "surname": "Test",
        "accountEnabled": enabled
    })
}

/// Wraps items in an OData response.
pub fn odata_page(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({ "value": items });
    if let Some(link) = next_link {
        response["@odata.nextLink"] = json!(link);
    }
    response
}
