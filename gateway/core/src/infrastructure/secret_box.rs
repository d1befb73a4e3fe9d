// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Secret Box
//!
//! Seals provider API keys before they are written to the settings store.
//! AES-256-GCM with a random 96-bit nonce; the 256-bit key is the SHA-256
//! digest of the configured `settings_key` passphrase.
//!
//! Sealed values are stored as `enc:v1:<base64(nonce || ciphertext)>`.
//! Values without the prefix are treated as plaintext so rows written
//! before a key was configured keep working.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

pub const SEALED_PREFIX: &str = "enc:v1:";

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecretBoxError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed (wrong settings key or corrupted value)")]
    DecryptionFailed,

    #[error("Sealed value is malformed: {0}")]
    Malformed(String),

    #[error("Value is sealed but no settings key is configured")]
    MissingKey,
}

#[derive(Clone)]
pub struct SecretBox {
    key: Option<[u8; 32]>,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox")
            .field("enabled", &self.key.is_some())
            .finish()
    }
}

impl SecretBox {
    /// `None` or an empty passphrase disables sealing
    pub fn new(passphrase: Option<&str>) -> Self {
        let key = passphrase.filter(|p| !p.is_empty()).map(|p| {
            let digest = Sha256::digest(p.as_bytes());
            let mut key = [0u8; 32];
            key.copy_from_slice(&digest);
            key
        });
        Self { key }
    }

    pub fn disabled() -> Self {
        Self { key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(SEALED_PREFIX)
    }

    /// Seal a plaintext value. Passes the value through when no key is set.
    pub fn seal(&self, plaintext: &str) -> Result<String, SecretBoxError> {
        let Some(key_bytes) = &self.key else {
            return Ok(plaintext.to_string());
        };
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| SecretBoxError::EncryptionFailed)?;

        let mut bytes = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", SEALED_PREFIX, STANDARD.encode(bytes)))
    }

    /// Open a stored value; unsealed values are returned unchanged
    pub fn open(&self, stored: &str) -> Result<String, SecretBoxError> {
        let Some(encoded) = stored.strip_prefix(SEALED_PREFIX) else {
            return Ok(stored.to_string());
        };
        let key_bytes = self.key.as_ref().ok_or(SecretBoxError::MissingKey)?;

        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| SecretBoxError::Malformed(e.to_string()))?;
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(SecretBoxError::Malformed("value too short".into()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LENGTH);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretBoxError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|e| SecretBoxError::Malformed(e.to_string()))
    }
}
