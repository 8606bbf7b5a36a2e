//! Mock SCIM directory using wiremock.
//!
//! Serves `GET /Users` from a fixed user list, honoring `startIndex` and
//! `count`, and records mutations for assertions.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use dirsync_scim_client::{RetryPolicy, ScimAuth, ScimClient};

pub const TEST_TOKEN: &str = "dsync_test-token";

pub struct MockScimServer {
    server: MockServer,
}

/// Pages a fixed list of users by `startIndex`/`count`.
struct PagedUsers {
    users: Vec<Value>,
    /// Overrides the reported `totalResults`.
    reported_total: Option<i64>,
}

impl Respond for PagedUsers {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut start_index = 1usize;
        let mut count = 100usize;
        for (key, value) in request.url.query_pairs() {
            match key.as_ref() {
                "startIndex" => start_index = value.parse().unwrap_or(1),
                "count" => count = value.parse().unwrap_or(100),
                _ => {}
            }
        }
        let from = start_index.saturating_sub(1).min(self.users.len());
        let to = (from + count).min(self.users.len());
        let page: Vec<Value> = self.users[from..to].to_vec();
        ResponseTemplate::new(200).set_body_json(json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:ListResponse"],
            "totalResults": self.reported_total.unwrap_or(self.users.len() as i64),
            "startIndex": start_index,
            "itemsPerPage": page.len(),
            "Resources": page
        }))
    }
}

impl MockScimServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Client with retries that do not sleep.
    pub fn client(&self) -> ScimClient {
        ScimClient::with_http_client(
            &self.uri(),
            ScimAuth::bearer(TEST_TOKEN),
            reqwest::Client::new(),
        )
        .with_retry_policy(RetryPolicy {
            max_retries: 2,
            base_delay: std::time::Duration::ZERO,
            max_delay: std::time::Duration::ZERO,
        })
    }

    pub async fn mock_users(&self, users: Vec<Value>) {
        self.mock_users_with_total(users, None).await;
    }

    pub async fn mock_users_with_total(&self, users: Vec<Value>, reported_total: Option<i64>) {
        Mock::given(method("GET"))
            .and(path("/Users"))
            .and(header("Authorization", format!("Bearer {TEST_TOKEN}").as_str()))
            .respond_with(PagedUsers {
                users,
                reported_total,
            })
            .mount(&self.server)
            .await;
    }

    pub async fn mock_create_user(&self) {
        Mock::given(method("POST"))
            .and(path("/Users"))
            .respond_with(|request: &Request| {
                let mut body: Value = serde_json::from_slice(&request.body).unwrap_or(json!({}));
                body["id"] = json!(uuid_like(&body["userName"]));
                ResponseTemplate::new(201).set_body_json(body)
            })
            .mount(&self.server)
            .await;
    }

    pub async fn mock_replace_user(&self) {
        Mock::given(method("PUT"))
            .and(path_regex(r"^/Users/[^/]+$"))
            .respond_with(|request: &Request| {
                let mut body: Value = serde_json::from_slice(&request.body).unwrap_or(json!({}));
                let id = request.url.path().rsplit('/').next().unwrap_or_default().to_string();
                body["id"] = json!(id);
                ResponseTemplate::new(200).set_body_json(body)
            })
            .mount(&self.server)
            .await;
    }

    pub async fn mock_patch_user(&self) {
        Mock::given(method("PATCH"))
            .and(path_regex(r"^/Users/[^/]+$"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_delete_user(&self) {
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/Users/[^/]+$"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }

    /// Requests received with the given method.
    pub async fn requests(&self, http_method: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == http_method)
            .collect()
    }
}

fn uuid_like(user_name: &Value) -> String {
    format!("id-{}", user_name.as_str().unwrap_or("unknown"))
}

/// SCIM user resource as a directory would return it.
pub fn scim_user(id: &str, user_name: &str, display_name: &str, active: bool) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "id": id,
        "userName": user_name,
        "displayName": display_name,
        "name": {"givenName": display_name, "familyName": "Test"},
        "active": active
    })
}
