//! Bearer authentication for the directory.

use reqwest::RequestBuilder;

/// Bearer token for one sync pass.
///
/// The [`Debug`] impl redacts the token.
#[derive(Clone)]
pub struct ScimAuth {
    token: String,
}

impl ScimAuth {
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Apply authentication to a request builder.
    #[must_use]
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token)
    }
}

impl std::fmt::Debug for ScimAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bearer")
            .field("token", &"[REDACTED]")
            .finish()
    }
}
