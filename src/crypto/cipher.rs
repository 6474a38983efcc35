// src/crypto/cipher.rs

use std::env;
use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

use crate::errors::{OpsflowError, Result};

/// Environment variable holding the credential encryption secret.
pub const SECRET_KEY_ENV: &str = "OPSFLOW_SECRET_KEY";

/// Marks a stored value as ciphertext produced by [`Cipher::encrypt_string`].
pub const ENCRYPTED_PREFIX: &str = "enc:";

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for credentials at rest.
///
/// Ciphertext is `base64(nonce || ciphertext)`; every encryption uses a fresh
/// random nonce.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Derive the 256-bit key from an arbitrary secret string.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Build a cipher from `OPSFLOW_SECRET_KEY`, if set and non-empty.
    pub fn from_env() -> Option<Self> {
        env::var(SECRET_KEY_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| Self::from_secret(&s))
    }

    pub fn encrypt_string(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| OpsflowError::Crypto(e.to_string()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| OpsflowError::Crypto(format!("encryption failed: {e}")))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    pub fn decrypt_string(&self, encrypted: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| OpsflowError::Crypto(e.to_string()))?;

        let combined = general_purpose::STANDARD
            .decode(encrypted.trim())
            .map_err(|e| OpsflowError::Crypto(format!("base64 decode failed: {e}")))?;

        if combined.len() < NONCE_LEN {
            return Err(OpsflowError::Crypto(
                "invalid encrypted data: too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| OpsflowError::Crypto(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| OpsflowError::Crypto(format!("UTF-8 conversion failed: {e}")))
    }

    /// Produce a stored form: `enc:<ciphertext>`.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        Ok(format!("{ENCRYPTED_PREFIX}{}", self.encrypt_string(plaintext)?))
    }
}

/// Turn a stored credential into plaintext.
///
/// Values without the `enc:` prefix are returned unchanged. Encrypted values
/// require a cipher.
pub fn reveal(stored: &str, cipher: Option<&Cipher>) -> Result<String> {
    match stored.strip_prefix(ENCRYPTED_PREFIX) {
        None => Ok(stored.to_string()),
        Some(encrypted) => match cipher {
            Some(cipher) => cipher.decrypt_string(encrypted),
            None => Err(OpsflowError::Crypto(format!(
                "encrypted credential found but {SECRET_KEY_ENV} is not set"
            ))),
        },
    }
}
