//! On-disk encoding of the license store.
//!
//! A store is written either as a plain JSON mapping or wrapped in an
//! encrypted envelope:
//!
//! ```json
//! {
//!   "ciphertext": "<base64 of nonce || AES-256-GCM(store json)>",
//!   "format_version": "1",
//!   "updated_at": "2024-03-01T10:20:30Z"
//! }
//! ```
//!
//! Decoding detects the envelope by the presence of `ciphertext`, so plain
//! stores keep loading after encryption is switched on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encryption::{decrypt_from_base64, encrypt_to_base64, StoreKey};
use crate::errors::{LicenseError, LicenseResult};
use crate::store::LicenseStore;

/// Envelope format written by this version.
pub const FORMAT_VERSION: &str = "1";

/// Field whose presence marks an encrypted envelope.
const ENVELOPE_MARKER: &str = "ciphertext";

/// Encrypted wrapper around a serialized store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub ciphertext: String,
    pub format_version: String,
    pub updated_at: DateTime<Utc>,
}

impl EncryptedEnvelope {
    /// Encrypt `store` under `key`.
    pub fn seal(store: &LicenseStore, key: &StoreKey) -> LicenseResult<Self> {
        let plaintext = serde_json::to_vec(store)
            .map_err(|e| LicenseError::EncryptionFailed(format!("store serialization failed: {e}")))?;

        Ok(Self {
            ciphertext: encrypt_to_base64(&plaintext, key)?,
            format_version: FORMAT_VERSION.to_string(),
            updated_at: Utc::now(),
        })
    }

    /// Decrypt and parse the wrapped store.
    pub fn open(&self, key: &StoreKey) -> LicenseResult<LicenseStore> {
        if self.format_version != FORMAT_VERSION {
            return Err(LicenseError::MalformedStore(format!(
                "unsupported envelope format version '{}'",
                self.format_version
            )));
        }

        let plaintext = decrypt_from_base64(&self.ciphertext, key)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| LicenseError::MalformedStore(format!("decrypted store is invalid: {e}")))
    }
}

/// True when `value` is an encrypted envelope rather than a plain mapping.
pub fn is_envelope(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key(ENVELOPE_MARKER))
}

/// Serialize a store, encrypting it when a key is supplied.
pub fn encode_store(store: &LicenseStore, key: Option<&StoreKey>) -> LicenseResult<Vec<u8>> {
    let encoded = match key {
        Some(key) => {
            let envelope = EncryptedEnvelope::seal(store, key)?;
            serde_json::to_vec_pretty(&envelope)
        }
        None => serde_json::to_vec_pretty(store),
    };

    encoded.map_err(|e| LicenseError::MalformedStore(format!("store serialization failed: {e}")))
}

/// Parse bytes produced by [`encode_store`] (or by older plain-JSON tooling).
///
/// Empty input is an empty store. An envelope without a key, or one that
/// fails authentication, yields [`LicenseError::DecryptionFailed`].
pub fn decode_store(bytes: &[u8], key: Option<&StoreKey>) -> LicenseResult<LicenseStore> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(LicenseStore::new());
    }

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| LicenseError::MalformedStore(format!("invalid JSON: {e}")))?;

    if is_envelope(&value) {
        let envelope: EncryptedEnvelope = serde_json::from_value(value)
            .map_err(|e| LicenseError::MalformedStore(format!("invalid envelope: {e}")))?;

        let key = key.ok_or_else(|| {
            LicenseError::DecryptionFailed(
                "store is encrypted but no encryption key is configured".to_string(),
            )
        })?;

        return envelope.open(key);
    }

    if key.is_some() {
        log::debug!("Store is not encrypted; it will be encrypted on next write");
    }

    serde_json::from_value(value)
        .map_err(|e| LicenseError::MalformedStore(format!("invalid license mapping: {e}")))
}
