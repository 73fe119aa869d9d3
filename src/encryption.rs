//! Symmetric encryption for the license store.
//!
//! AES-256-GCM with a random 96-bit nonce per message. The key is always
//! supplied by the caller (see [`StoreKey`]); nothing here embeds one.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use rand::rngs::OsRng;
use rand::TryRngCore;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use sha2::{Digest, Sha256};

use crate::errors::{InputError, LicenseError, LicenseResult};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Pre-shared key protecting the license store at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreKey([u8; KEY_SIZE]);

impl StoreKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Interpret secret material from configuration.
    ///
    /// Accepted forms, tried in order:
    /// - 64 hex characters (raw key),
    /// - base64 that decodes to exactly 32 bytes (raw key),
    /// - anything else is a passphrase; the key is its SHA-256.
    pub fn from_secret(secret: &str) -> LicenseResult<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(InputError::InvalidKey("key material is empty".to_string()).into());
        }

        if secret.len() == KEY_SIZE * 2 {
            if let Ok(raw) = hex::decode(secret) {
                return Self::from_slice(&raw);
            }
        }

        if let Ok(raw) = B64.decode(secret) {
            if raw.len() == KEY_SIZE {
                return Self::from_slice(&raw);
            }
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&Sha256::digest(secret.as_bytes()));
        Ok(Self(key))
    }

    fn from_slice(raw: &[u8]) -> LicenseResult<Self> {
        let bytes: [u8; KEY_SIZE] = raw.try_into().map_err(|_| {
            InputError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Generate a new random key. Caller is responsible for storing it safely.
    pub fn generate() -> LicenseResult<Self> {
        let mut key = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| LicenseError::EncryptionFailed(format!("key generation failed: {e}")))?;
        Ok(Self(key))
    }

    /// Base64 form suitable for `store.encryption_key`.
    pub fn to_base64(&self) -> String {
        B64.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreKey(<redacted>)")
    }
}

/// Encrypt arbitrary bytes using AES-256-GCM.
///
/// Output format:
///   [nonce (12 bytes)] || [ciphertext+tag]
pub fn encrypt_bytes(plaintext: &[u8], key: &StoreKey) -> LicenseResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| LicenseError::EncryptionFailed(format!("nonce generation failed: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| LicenseError::EncryptionFailed(format!("encryption failed: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.append(&mut ciphertext);

    Ok(output)
}

/// Decrypt bytes produced by `encrypt_bytes`.
///
/// A wrong key and a corrupted message are indistinguishable: both fail
/// authentication and yield [`LicenseError::DecryptionFailed`].
pub fn decrypt_bytes(ciphertext: &[u8], key: &StoreKey) -> LicenseResult<Vec<u8>> {
    if ciphertext.len() <= NONCE_SIZE {
        return Err(LicenseError::DecryptionFailed(
            "ciphertext too short".to_string(),
        ));
    }

    let (nonce_bytes, ct) = ciphertext.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ct)
        .map_err(|_| LicenseError::DecryptionFailed("authentication failed".to_string()))
}

/// Encrypt bytes and return a Base64 string.
pub fn encrypt_to_base64(plaintext: &[u8], key: &StoreKey) -> LicenseResult<String> {
    let encrypted = encrypt_bytes(plaintext, key)?;
    Ok(B64.encode(encrypted))
}

/// Decrypt a Base64 ciphertext previously produced by `encrypt_to_base64`.
pub fn decrypt_from_base64(ciphertext_b64: &str, key: &StoreKey) -> LicenseResult<Vec<u8>> {
    let decoded = B64
        .decode(ciphertext_b64.trim())
        .map_err(|e| LicenseError::DecryptionFailed(format!("base64 decode failed: {e}")))?;
    decrypt_bytes(&decoded, key)
}
