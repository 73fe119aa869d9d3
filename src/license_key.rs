//! License key derivation and validation.
//!
//! Two schemes exist:
//!
//! - [`KeyScheme::Deterministic`] (default): the first 16 hex characters of
//!   `SHA-256(machine_id + ":" + customer_name)`. Re-issuing for the same pair
//!   reproduces the key, which allows idempotent re-licensing and lookup by
//!   recomputation.
//! - [`KeyScheme::Randomized`] (deprecated): the first 12 hex characters of
//!   `MD5(machine_id + "-" + customer_name + "-" + hex(4 random bytes))`.
//!   Only usable as an opaque identifier.
//!
//! # Example
//!
//! ```rust,ignore
//! use myp_license::hardware::{MachineIdentity, Validation};
//! use myp_license::license_key::{derive_license_key, KeyScheme};
//!
//! let machine = MachineIdentity::parse("aa:bb:cc:dd:ee:ff", Validation::Strict)?;
//! let key = derive_license_key(&machine, "Acme Corp", KeyScheme::Deterministic);
//! assert_eq!(key, "8124d4f40ba71015");
//! ```

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{LicenseError, LicenseResult};
use crate::hardware::MachineIdentity;

/// Length of a deterministic key in hex characters.
pub const DETERMINISTIC_KEY_LEN: usize = 16;

/// Length of a randomized key in hex characters.
pub const RANDOMIZED_KEY_LEN: usize = 12;

/// Random bytes mixed into a randomized key.
const RANDOM_COMPONENT_BYTES: usize = 4;

/// Key derivation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    #[default]
    Deterministic,
    Randomized,
}

impl KeyScheme {
    /// Number of hex characters in keys produced by this scheme.
    pub fn key_len(&self) -> usize {
        match self {
            KeyScheme::Deterministic => DETERMINISTIC_KEY_LEN,
            KeyScheme::Randomized => RANDOMIZED_KEY_LEN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyScheme::Deterministic => "deterministic",
            KeyScheme::Randomized => "randomized",
        }
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyScheme {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deterministic" => Ok(KeyScheme::Deterministic),
            "randomized" | "random" => Ok(KeyScheme::Randomized),
            other => Err(LicenseError::ConfigError(format!(
                "unknown key scheme '{other}': expected 'deterministic' or 'randomized'"
            ))),
        }
    }
}

/// Derive the license key for a machine/customer pair.
pub fn derive_license_key(
    machine: &MachineIdentity,
    customer_name: &str,
    scheme: KeyScheme,
) -> String {
    match scheme {
        KeyScheme::Deterministic => {
            let digest = Sha256::digest(format!("{}:{}", machine, customer_name).as_bytes());
            let mut key = hex::encode(digest);
            key.truncate(DETERMINISTIC_KEY_LEN);
            key
        }
        KeyScheme::Randomized => {
            let mut random = [0u8; RANDOM_COMPONENT_BYTES];
            rand::rng().fill_bytes(&mut random);
            randomized_key_with(machine, customer_name, &hex::encode(random))
        }
    }
}

/// Randomized derivation with an explicit random component.
fn randomized_key_with(machine: &MachineIdentity, customer_name: &str, random_hex: &str) -> String {
    let digest = md5::compute(format!("{}-{}-{}", machine, customer_name, random_hex));
    let mut key = format!("{:x}", digest);
    key.truncate(RANDOMIZED_KEY_LEN);
    key
}

/// Check that a key has the length and alphabet produced by `scheme`.
pub fn validate_license_key_format(key: &str, scheme: KeyScheme) -> bool {
    key.len() == scheme.key_len()
        && key
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch))
}

/// Check whether `key` is the deterministic key for the pair.
///
/// Always false for keys issued under the randomized scheme.
pub fn verify_deterministic_key(machine: &MachineIdentity, customer_name: &str, key: &str) -> bool {
    derive_license_key(machine, customer_name, KeyScheme::Deterministic) == key
}

/// Parse a scheme name from configuration or the command line.
pub fn parse_scheme(value: &str) -> LicenseResult<KeyScheme> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Validation;

    fn acme_machine() -> MachineIdentity {
        MachineIdentity::parse("aa:bb:cc:dd:ee:ff", Validation::Strict).unwrap()
    }

    #[test]
    fn deterministic_key_matches_known_vector() {
        let key = derive_license_key(&acme_machine(), "Acme Corp", KeyScheme::Deterministic);
        assert_eq!(key, "8124d4f40ba71015");
    }

    #[test]
    fn deterministic_key_is_reproducible() {
        let machine = acme_machine();
        let first = derive_license_key(&machine, "Acme Corp", KeyScheme::Deterministic);
        let second = derive_license_key(&machine, "Acme Corp", KeyScheme::Deterministic);
        assert_eq!(first, second);
        assert!(validate_license_key_format(&first, KeyScheme::Deterministic));
    }

    #[test]
    fn deterministic_key_depends_on_both_inputs() {
        let machine = acme_machine();
        let other_machine = MachineIdentity::from_node(0x1122_3344_5566);

        let base = derive_license_key(&machine, "Acme Corp", KeyScheme::Deterministic);
        assert_ne!(
            base,
            derive_license_key(&machine, "Acme Corp.", KeyScheme::Deterministic)
        );
        assert_ne!(
            base,
            derive_license_key(&other_machine, "Acme Corp", KeyScheme::Deterministic)
        );
    }

    #[test]
    fn randomized_key_has_fixed_length_and_varies() {
        let machine = acme_machine();
        let mut keys = std::collections::HashSet::new();
        for _ in 0..50 {
            let key = derive_license_key(&machine, "Acme Corp", KeyScheme::Randomized);
            assert!(validate_license_key_format(&key, KeyScheme::Randomized));
            keys.insert(key);
        }
        assert!(keys.len() > 1, "randomized keys should not repeat every time");
    }

    #[test]
    fn randomized_key_uses_md5_prefix() {
        let key = randomized_key_with(&acme_machine(), "Acme Corp", "00000000");
        assert_eq!(key, "3c1cea1193c5");
    }

    #[test]
    fn validate_format_rejects_wrong_length_and_alphabet() {
        assert!(!validate_license_key_format("8124d4f40ba7101", KeyScheme::Deterministic));
        assert!(!validate_license_key_format("8124D4F40BA71015", KeyScheme::Deterministic));
        assert!(!validate_license_key_format("8124d4f40ba7101g", KeyScheme::Deterministic));
        assert!(!validate_license_key_format("8124d4f40ba71015", KeyScheme::Randomized));
    }

    #[test]
    fn verify_deterministic_key_recomputes() {
        let machine = acme_machine();
        assert!(verify_deterministic_key(&machine, "Acme Corp", "8124d4f40ba71015"));
        assert!(!verify_deterministic_key(&machine, "Other", "8124d4f40ba71015"));
    }

    #[test]
    fn scheme_parses_from_config_strings() {
        assert_eq!(parse_scheme("deterministic").unwrap(), KeyScheme::Deterministic);
        assert_eq!(parse_scheme(" Randomized ").unwrap(), KeyScheme::Randomized);
        assert!(parse_scheme("sha1").is_err());
        assert_eq!(KeyScheme::Randomized.to_string(), "randomized");
    }
}
