//! Error types for provider adapters.

use thiserror::Error;

/// Result type alias using `ConnectorError`.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors raised while talking to an identity provider or handling its
/// credentials.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Invalid or incomplete adapter configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The bridge names a provider kind with no adapter.
    #[error("Unsupported provider kind: {0}")]
    UnsupportedProvider(String),

    /// `OAuth2` token endpoint rejected the request.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The access token expired and there is no usable refresh token.
    #[error("Provider credentials expired and cannot be refreshed")]
    CredentialsExpired,

    /// Provider API returned a non-success status.
    #[error("Provider API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Encryption failed: {message}")]
    EncryptionFailed { message: String },

    #[error("Decryption failed: {message}")]
    DecryptionFailed { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl ConnectorError {
    /// True for failures that retrying the same bridge cannot fix without an
    /// operator changing its configuration or credentials.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnsupportedProvider(_)
                | Self::CredentialsExpired
                | Self::DecryptionFailed { .. }
                | Self::Serialization { .. }
        )
    }

    /// HTTP status code of an API error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
