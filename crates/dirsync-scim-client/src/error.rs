//! Error types for the SCIM directory client.

use thiserror::Error;

pub type ScimClientResult<T> = Result<T, ScimClientError>;

/// Errors returned by [`ScimClient`](crate::client::ScimClient).
///
/// Every variant produced from an HTTP response carries its status code and
/// body.
#[derive(Debug, Error)]
pub enum ScimClientError {
    #[error("Authentication failed (401): {0}")]
    AuthError(String),

    #[error("Resource not found (404): {0}")]
    NotFound(String),

    #[error("Conflict (409): {0}")]
    Conflict(String),

    #[error("Rate limited (429), retry after {retry_after_secs:?}s: {body}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        body: String,
    },

    #[error("SCIM error (HTTP {status}): {detail}")]
    ScimError { status: u16, detail: String },

    #[error("Directory unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    HttpError(reqwest::Error),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

impl From<reqwest::Error> for ScimClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Unreachable(e.to_string())
        } else {
            Self::HttpError(e)
        }
    }
}

impl ScimClientError {
    /// Transient failures worth retrying: rate limiting, gateway errors and
    /// connection problems.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Unreachable(_) | Self::Timeout(_) => true,
            Self::ScimError { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// HTTP status code for errors produced from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::NotFound(_) => Some(404),
            Self::Conflict(_) => Some(409),
            Self::RateLimited { .. } => Some(429),
            Self::ScimError { status, .. } => Some(*status),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
