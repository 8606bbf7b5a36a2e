//! SCIM 2.0 wire types (RFC 7643 / RFC 7644 subset).

use serde::{Deserialize, Serialize};

use dirsync_core::{CanonicalUser, DirectoryUser};

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScimEmail {
    pub value: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub email_type: Option<String>,
}

/// A SCIM user resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimUser {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ScimName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<ScimEmail>,
}

impl ScimUser {
    /// Build the full payload sent on create and replace.
    ///
    /// The username doubles as the primary work email.
    #[must_use]
    pub fn from_canonical(user: &CanonicalUser) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            schemas: vec![USER_SCHEMA.to_string()],
            id: None,
            user_name: user.username.clone(),
            name: Some(ScimName {
                given_name: non_empty(&user.given_name),
                family_name: non_empty(&user.family_name),
            }),
            display_name: Some(user.display_name.clone()),
            active: user.active,
            emails: vec![ScimEmail {
                value: user.username.clone(),
                primary: true,
                email_type: Some("work".to_string()),
            }],
        }
    }

    /// Map a listed resource into a [`DirectoryUser`]. Resources without an
    /// id cannot be addressed and yield `None`.
    #[must_use]
    pub fn into_directory_user(self) -> Option<DirectoryUser> {
        let id = self.id?;
        let name = self.name.unwrap_or_default();
        let user = CanonicalUser::new(
            self.user_name,
            self.display_name.unwrap_or_default(),
            self.active,
        )
        .with_name(
            name.given_name.unwrap_or_default(),
            name.family_name.unwrap_or_default(),
        );
        Some(DirectoryUser::new(id, user))
    }
}

/// `GET /Users` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimListResponse {
    #[serde(default)]
    pub schemas: Vec<String>,
    pub total_results: i64,
    #[serde(default)]
    pub start_index: Option<i64>,
    #[serde(default)]
    pub items_per_page: Option<i64>,
    #[serde(rename = "Resources", default)]
    pub resources: Vec<ScimUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOperation>,
}

impl PatchRequest {
    /// `replace active=false`, the only patch the sync sends.
    #[must_use]
    pub fn deactivate() -> Self {
        Self {
            schemas: vec![PATCH_OP_SCHEMA.to_string()],
            operations: vec![PatchOperation {
                op: "replace".to_string(),
                path: Some("active".to_string()),
                value: Some(serde_json::Value::Bool(false)),
            }],
        }
    }
}
