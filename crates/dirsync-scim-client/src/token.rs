//! Directory bearer token rotation.
//!
//! A fresh token is minted for every sync pass. Only its SHA-256 hash is
//! stored on the directory target row; the raw value lives in memory for the
//! duration of the pass.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix for directory sync tokens.
pub const TOKEN_PREFIX: &str = "dsync_";

/// A freshly minted token and its storage hash.
#[derive(Clone)]
pub struct DirectoryToken {
    pub raw: String,
    pub hash: String,
}

impl std::fmt::Debug for DirectoryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryToken")
            .field("raw", &"[REDACTED]")
            .field("hash", &self.hash)
            .finish()
    }
}

/// Generate a new random token.
#[must_use]
pub fn generate_directory_token() -> DirectoryToken {
    let mut random_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut random_bytes);

    let raw = format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(random_bytes));
    let hash = hash_token(&raw);
    DirectoryToken { raw, hash }
}

/// SHA-256 hex digest of a token.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
