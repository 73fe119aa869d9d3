//! Machine identity resolution.
//!
//! A machine is identified by the hardware address of its primary network
//! adapter, written as six colon-separated lowercase hex pairs
//! (`aa:bb:cc:dd:ee:ff`), most significant byte first.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{InputError, LicenseError, LicenseResult};

/// Number of byte groups in a machine identifier.
pub const MACHINE_ID_GROUPS: usize = 6;

lazy_static! {
    static ref HEX_PAIR: Regex = Regex::new(r"^[0-9a-fA-F]{2}$").expect("static regex is valid");
}

/// How strictly a user-supplied machine identifier is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// Six groups, each exactly two hex digits.
    #[default]
    Strict,
    /// Six groups, content unchecked. Matches identifiers accepted by
    /// earlier versions of the tooling.
    Lenient,
}

/// Canonical machine identifier.
///
/// Values built through [`MachineIdentity::parse`] or the resolver are always
/// lowercase. Deserialization does not re-validate: stores written by older
/// tooling may carry identifiers in other shapes and must still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineIdentity(String);

impl MachineIdentity {
    /// Parse and normalize a user-supplied identifier.
    pub fn parse(input: &str, validation: Validation) -> LicenseResult<Self> {
        let candidate = input.trim().to_ascii_lowercase();

        let valid = match validation {
            Validation::Strict => validate_machine_identity_strict(&candidate),
            Validation::Lenient => validate_machine_identity(&candidate),
        };

        if !valid {
            return Err(InputError::InvalidMachineId(input.trim().to_string()).into());
        }

        Ok(Self(candidate))
    }

    /// Build an identifier from raw adapter bytes.
    pub fn from_bytes(bytes: [u8; MACHINE_ID_GROUPS]) -> Self {
        let groups: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(groups.join(":"))
    }

    /// Build an identifier from a 48-bit node number. Bits above 48 are ignored.
    pub fn from_node(node: u64) -> Self {
        let be = node.to_be_bytes();
        let mut bytes = [0u8; MACHINE_ID_GROUPS];
        bytes.copy_from_slice(&be[2..]);
        Self::from_bytes(bytes)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex SHA-256 of the identifier, stored alongside records as
    /// a non-reversible reference.
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the identifier of the current machine.
///
/// Uses the primary network adapter's hardware address. Fails with
/// [`LicenseError::IdentityUnavailable`] when the platform cannot report one;
/// callers should then ask for the identifier manually.
pub fn resolve_machine_identity() -> LicenseResult<MachineIdentity> {
    match mac_address::get_mac_address() {
        Ok(Some(mac)) => {
            let identity = MachineIdentity::from_bytes(mac.bytes());
            log::debug!("Resolved machine identity {}", identity);
            Ok(identity)
        }
        Ok(None) => Err(LicenseError::IdentityUnavailable(
            "no network adapter with a hardware address was found".to_string(),
        )),
        Err(e) => Err(LicenseError::IdentityUnavailable(format!(
            "failed to read hardware address: {e}"
        ))),
    }
}

/// Lenient shape check: exactly six colon-separated components.
///
/// Component content is not inspected.
pub fn validate_machine_identity(s: &str) -> bool {
    s.split(':').count() == MACHINE_ID_GROUPS
}

/// Strict shape check: six colon-separated pairs of hex digits.
pub fn validate_machine_identity_strict(s: &str) -> bool {
    validate_machine_identity(s) && s.split(':').all(|group| HEX_PAIR.is_match(group))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_identity_is_stable_and_canonical() {
        match (resolve_machine_identity(), resolve_machine_identity()) {
            (Ok(first), Ok(second)) => {
                assert_eq!(first, second, "machine identity should be stable");
                assert!(validate_machine_identity_strict(first.as_str()));
                assert_eq!(first.as_str(), first.as_str().to_ascii_lowercase());
            }
            (Err(_), Err(_)) => {
                // Acceptable in sandboxes without network interfaces.
            }
            _ => panic!("machine identity resolution is inconsistent"),
        }
    }

    #[test]
    fn from_node_is_most_significant_byte_first() {
        let id = MachineIdentity::from_node(0x0000_aabb_ccdd_eeff);
        assert_eq!(id.as_str(), "aa:bb:cc:dd:ee:ff");

        let id = MachineIdentity::from_node(0x0102);
        assert_eq!(id.as_str(), "00:00:00:00:01:02");
    }

    #[test]
    fn from_node_ignores_bits_above_48() {
        let id = MachineIdentity::from_node(0xffff_0000_0000_0001);
        assert_eq!(id.as_str(), "00:00:00:00:00:01");
    }

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let id = MachineIdentity::parse("  AA:BB:CC:DD:EE:FF \n", Validation::Strict).unwrap();
        assert_eq!(id.as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn strict_parse_rejects_non_hex_groups() {
        let err = MachineIdentity::parse("zz:bb:cc:dd:ee:ff", Validation::Strict).unwrap_err();
        assert!(matches!(
            err,
            LicenseError::InvalidInput(InputError::InvalidMachineId(_))
        ));

        assert!(MachineIdentity::parse("a:bb:cc:dd:ee:ff", Validation::Strict).is_err());
        assert!(MachineIdentity::parse("aaa:bb:cc:dd:ee:ff", Validation::Strict).is_err());
    }

    #[test]
    fn lenient_parse_only_counts_groups() {
        let id = MachineIdentity::parse("zz:bb:cc:dd:ee:ff", Validation::Lenient).unwrap();
        assert_eq!(id.as_str(), "zz:bb:cc:dd:ee:ff");

        assert!(MachineIdentity::parse("aa:bb:cc:dd:ee", Validation::Lenient).is_err());
        assert!(MachineIdentity::parse("aa:bb:cc:dd:ee:ff:00", Validation::Lenient).is_err());
    }

    #[test]
    fn validate_counts_components_only() {
        assert!(validate_machine_identity("aa:bb:cc:dd:ee:ff"));
        assert!(validate_machine_identity("x:y:z:1:2:3"));
        assert!(!validate_machine_identity("aa-bb-cc-dd-ee-ff"));
        assert!(!validate_machine_identity(""));
    }

    #[test]
    fn strict_validation_checks_hex_content() {
        assert!(validate_machine_identity_strict("aa:bb:cc:dd:ee:ff"));
        assert!(validate_machine_identity_strict("AA:0b:C1:dd:e9:ff"));
        assert!(!validate_machine_identity_strict("x:y:z:1:2:3"));
        assert!(!validate_machine_identity_strict("aa:bb:cc:dd:ee:fg"));
    }

    #[test]
    fn hash_is_sha256_hex_of_canonical_form() {
        let id = MachineIdentity::parse("AA:BB:CC:DD:EE:FF", Validation::Strict).unwrap();
        assert_eq!(
            id.hash(),
            "c1582e87c802221899199e286ead9a7ed13eb3b5e3827be6cc149fb82a9e04f7"
        );
    }
}
