//! Provider credential encryption.
//!
//! AES-256-GCM with HKDF per-tenant key derivation. Ciphertexts are laid out
//! as `nonce || ciphertext || tag`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{ConnectorError, ConnectorResult};

/// Length of AES-256 key in bytes.
pub const KEY_LENGTH: usize = 32;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Context string for HKDF key derivation.
const HKDF_INFO: &[u8] = b"dirsync-provider-credentials-v1";

/// Encrypts and decrypts provider credentials with per-tenant keys.
#[derive(Clone)]
pub struct CredentialEncryption {
    master_key: [u8; KEY_LENGTH],
}

impl CredentialEncryption {
    #[must_use]
    pub fn new(master_key: [u8; KEY_LENGTH]) -> Self {
        Self { master_key }
    }

    /// Create from a hex-encoded 32-byte master key.
    pub fn from_hex(hex_key: &str) -> ConnectorResult<Self> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| ConnectorError::EncryptionFailed {
            message: format!("invalid hex key: {e}"),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Create from a base64-encoded 32-byte master key.
    pub fn from_base64(base64_key: &str) -> ConnectorResult<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let bytes =
            STANDARD
                .decode(base64_key.trim())
                .map_err(|e| ConnectorError::EncryptionFailed {
                    message: format!("invalid base64 key: {e}"),
                })?;
        Self::from_bytes(&bytes)
    }

    /// Accept either encoding. A 64-character hex string is tried first.
    pub fn from_encoded(key: &str) -> ConnectorResult<Self> {
        let key = key.trim();
        if key.len() == KEY_LENGTH * 2 && key.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::from_hex(key)
        } else {
            Self::from_base64(key)
        }
    }

    fn from_bytes(bytes: &[u8]) -> ConnectorResult<Self> {
        let key: [u8; KEY_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| ConnectorError::EncryptionFailed {
                    message: format!("key must be {} bytes, got {}", KEY_LENGTH, bytes.len()),
                })?;
        Ok(Self::new(key))
    }

    fn cipher_for(&self, tenant_id: Uuid) -> Result<Aes256Gcm, String> {
        let hkdf = Hkdf::<Sha256>::new(Some(tenant_id.as_bytes()), &self.master_key);
        let mut derived_key = [0u8; KEY_LENGTH];
        hkdf.expand(HKDF_INFO, &mut derived_key)
            .map_err(|e| format!("key derivation failed: {e}"))?;
        Aes256Gcm::new_from_slice(&derived_key).map_err(|e| format!("failed to create cipher: {e}"))
    }

    /// Encrypt bytes for a tenant.
    pub fn encrypt(&self, tenant_id: Uuid, plaintext: &[u8]) -> ConnectorResult<Vec<u8>> {
        let cipher = self
            .cipher_for(tenant_id)
            .map_err(|message| ConnectorError::EncryptionFailed { message })?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext =
            cipher
                .encrypt(nonce, plaintext)
                .map_err(|e| ConnectorError::EncryptionFailed {
                    message: format!("encryption failed: {e}"),
                })?;

        let mut result = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt bytes previously produced by [`encrypt`](Self::encrypt) for
    /// the same tenant.
    pub fn decrypt(&self, tenant_id: Uuid, ciphertext: &[u8]) -> ConnectorResult<Vec<u8>> {
        if ciphertext.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(ConnectorError::DecryptionFailed {
                message: "ciphertext too short".to_string(),
            });
        }

        let cipher = self
            .cipher_for(tenant_id)
            .map_err(|message| ConnectorError::DecryptionFailed { message })?;

        let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_LENGTH);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|e| ConnectorError::DecryptionFailed {
                message: format!("decryption failed: {e}"),
            })
    }

    pub fn encrypt_json<T: serde::Serialize>(
        &self,
        tenant_id: Uuid,
        value: &T,
    ) -> ConnectorResult<Vec<u8>> {
        let json = serde_json::to_vec(value).map_err(|e| ConnectorError::Serialization {
            message: format!("failed to serialize credentials: {e}"),
        })?;
        self.encrypt(tenant_id, &json)
    }

    pub fn decrypt_json<T: serde::de::DeserializeOwned>(
        &self,
        tenant_id: Uuid,
        ciphertext: &[u8],
    ) -> ConnectorResult<T> {
        let plaintext = self.decrypt(tenant_id, ciphertext)?;
        serde_json::from_slice(&plaintext).map_err(|e| ConnectorError::Serialization {
            message: format!("failed to deserialize credentials: {e}"),
        })
    }
}

impl std::fmt::Debug for CredentialEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEncryption")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}
