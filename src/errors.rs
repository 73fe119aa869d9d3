//! Error types shared by the license issuing core.

use thiserror::Error;

/// Rejected caller input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    /// Expiry is not a `YYYY-MM-DD` calendar date.
    #[error("invalid expiry date '{0}': expected YYYY-MM-DD")]
    InvalidExpiry(String),

    /// Customer name is empty after trimming whitespace.
    #[error("customer name cannot be empty")]
    InvalidCustomer,

    /// Machine identifier does not have the expected shape.
    #[error("invalid machine id '{0}': expected six colon-separated hex pairs")]
    InvalidMachineId(String),

    /// Encryption key material could not be used.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
}

/// Errors produced while issuing, encoding or persisting licenses.
#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("machine identity unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("malformed license store: {0}")]
    MalformedStore(String),

    #[error("failed to persist license store: {0}")]
    PersistFailed(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),
}

impl LicenseError {
    /// True for failures that leave prior state unknown but should not abort
    /// an issuing run (the caller substitutes an empty store).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LicenseError::DecryptionFailed(_)
                | LicenseError::MalformedStore(_)
                | LicenseError::NetworkUnavailable(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;
