//! myp-license - issuing machine-bound licenses for the MYP desktop application
//!
//! A license binds a customer to a machine identifier (the primary network
//! adapter's hardware address) until an expiry date. Issued licenses are
//! merged into a JSON license store that can be encrypted at rest with a
//! pre-shared AES-256-GCM key.
//!
//! # Example
//!
//! ```rust,ignore
//! use myp_license::issue::{Issuer, LicenseRequest};
//!
//! let issuer = Issuer::new("licenses.json");
//! let issued = issuer.issue(&LicenseRequest {
//!     machine_id: "aa:bb:cc:dd:ee:ff".into(),
//!     customer_name: "Acme Corp".into(),
//!     expiry: Some("2025-01-01".into()),
//!     features: vec![],
//! })?;
//! println!("{}", issued.record.license_key);
//! ```

pub mod config;
pub mod encrypted_storage;
pub mod encryption;
pub mod errors;
pub mod hardware;
pub mod issue;
pub mod license_key;
pub mod prompt;
pub mod record;
pub mod remote;
pub mod storage;
pub mod store;
