//! Payload encryption for the remote tier

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::fmt;

use tiercache_core::{CacheError, Result};

use crate::key::DEFAULT_SECRET;

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for values stored remotely
///
/// The key is the SHA-256 of the application secret. Stored form is
/// `base64(nonce || ciphertext)`.
#[derive(Clone)]
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PayloadCipher")
    }
}

impl PayloadCipher {
    /// Derive the cipher key from `secret` (or the default secret)
    pub fn new(secret: Option<&str>) -> Self {
        let secret = secret.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SECRET);
        Self {
            cipher: Aes256Gcm::new(&Sha256::digest(secret.as_bytes())),
        }
    }

    /// Encrypt a plaintext payload
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CacheError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed).into_bytes())
    }

    /// Decrypt a payload produced by [`encrypt`](Self::encrypt)
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let sealed = STANDARD
            .decode(payload)
            .map_err(|e| CacheError::Encryption(e.to_string()))?;
        if sealed.len() < NONCE_LEN {
            return Err(CacheError::Encryption("payload shorter than nonce".into()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CacheError::Encryption(e.to_string()))
    }

    /// Decrypt, falling back to the payload itself when it isn't ours
    ///
    /// Values written with encryption off (or by an older deployment) stay
    /// readable after it is switched on.
    pub fn decrypt_or_raw(&self, payload: Vec<u8>) -> Vec<u8> {
        match self.decrypt(&payload) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::debug!(target: "tiercache", error = %e, "payload not encrypted, using raw bytes");
                payload
            }
        }
    }
}
