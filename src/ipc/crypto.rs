//! IPC Session Crypto
//!
//! Per-session credentials (128-bit token, 256-bit AES key), token-derived
//! key wrapping for the handshake, and AES-256-GCM frame sealing with a
//! fresh random 96-bit IV per message.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::wire::{IV_LEN, MAX_PLAINTEXT_LEN};
use crate::errors::ChronosError;

pub const SESSION_KEY_LEN: usize = 32;

/// Per-session authentication material, generated once at server startup.
/// The token is retrievable only through an in-process API and must never
/// be logged.
#[derive(Clone)]
pub struct SessionCredentials {
    token: String,
    key: [u8; SESSION_KEY_LEN],
}

impl SessionCredentials {
    /// Generate a fresh 128-bit token and 256-bit session key from the OS
    /// CSPRNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let token = Uuid::new_v4().simple().to_string();
        let mut key = [0u8; SESSION_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { token, key }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn key(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("token", &"[REDACTED]")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Handshake key derivation: SHA-256 over the token bytes.
pub fn derive_key_from_token(token: &[u8]) -> [u8; SESSION_KEY_LEN] {
    let digest = Sha256::digest(token);
    let mut key = [0u8; SESSION_KEY_LEN];
    key.copy_from_slice(&digest);
    key
}

/// Constant-time byte comparison for token and signature checks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// AES-256-GCM cipher for framed messages. One instance is kept per worker
/// thread for the lifetime of its connection.
pub struct FrameCipher {
    cipher: Aes256Gcm,
}

impl FrameCipher {
    pub fn new(key: &[u8; SESSION_KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Encrypt a plaintext, returning `(iv, ciphertext+tag)`. The IV comes
    /// from the OS CSPRNG and is unique per message.
    pub fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ChronosError> {
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(ChronosError::SerializationError {
                detail: format!(
                    "plaintext of {} bytes exceeds {MAX_PLAINTEXT_LEN} byte limit",
                    plaintext.len()
                ),
            });
        }
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            self.cipher
                .encrypt(&nonce, plaintext)
                .map_err(|_| ChronosError::SerializationError {
                    detail: "frame encryption failed".to_string(),
                })?;
        Ok((nonce.to_vec(), ciphertext))
    }

    /// Decrypt `(iv, ciphertext+tag)`. Authentication failure means the
    /// frame was tampered with or encrypted under a different key.
    pub fn open(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, ChronosError> {
        if iv.len() != IV_LEN {
            return Err(ChronosError::AuthenticationFailed {
                context: "frame decryption",
            });
        }
        self.cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| ChronosError::AuthenticationFailed {
                context: "frame decryption",
            })
    }
}
