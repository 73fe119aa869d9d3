//! Issuing a license end to end.
//!
//! [`Issuer::issue`] is a pure function of a fully populated
//! [`LicenseRequest`] plus the issuer settings. Front-ends only gather the
//! request and render the [`IssuedLicense`].

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::config::IssuerConfig;
use crate::encryption::StoreKey;
use crate::errors::LicenseResult;
use crate::hardware::{MachineIdentity, Validation};
use crate::license_key::KeyScheme;
use crate::record::{build_record, default_expiry, LicenseRecord, DEFAULT_FEATURE, DEFAULT_VALIDITY_DAYS};
use crate::storage::{merge_and_persist_with, PersistOptions, PersistResult, DEFAULT_STORE_FILE};
use crate::store::LicenseStore;

/// Everything needed to issue one license.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseRequest {
    /// Machine identifier as entered (normalized during issuing).
    pub machine_id: String,
    pub customer_name: String,
    /// `YYYY-MM-DD`; `None` applies the default validity.
    pub expiry: Option<String>,
    /// Empty applies the default feature set.
    pub features: Vec<String>,
}

/// A license that has been issued and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedLicense {
    pub record: LicenseRecord,
    pub persisted: PersistResult,
}

/// Issues licenses into a single store.
#[derive(Debug, Clone)]
pub struct Issuer {
    store_path: PathBuf,
    key: Option<StoreKey>,
    scheme: KeyScheme,
    validation: Validation,
    validity_days: i64,
    default_features: Vec<String>,
    options: PersistOptions,
}

impl Issuer {
    /// Issuer with built-in defaults writing to `store_path`, unencrypted.
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            key: None,
            scheme: KeyScheme::Deterministic,
            validation: Validation::Strict,
            validity_days: DEFAULT_VALIDITY_DAYS,
            default_features: vec![DEFAULT_FEATURE.to_string()],
            options: PersistOptions::default(),
        }
    }

    /// Issuer configured from an [`IssuerConfig`], resolving the store key.
    pub fn from_config(config: &IssuerConfig) -> LicenseResult<Self> {
        let scheme = config.license.scheme()?;

        Ok(Self {
            store_path: config.store.path.clone(),
            key: config.store.encryption_key()?,
            scheme,
            validation: config.identity.validation(),
            validity_days: config.license.default_validity_days,
            default_features: config.license.default_features.clone(),
            options: PersistOptions {
                fallback_path: config.store.fallback_path.clone(),
                seed: None,
                write_summary: config.store.write_summary,
            },
        })
    }

    pub fn with_key(mut self, key: Option<StoreKey>) -> Self {
        self.key = key;
        self
    }

    pub fn with_scheme(mut self, scheme: KeyScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn with_fallback_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.fallback_path = path.into();
        self
    }

    pub fn with_seed(mut self, seed: LicenseStore) -> Self {
        self.options.seed = Some(seed);
        self
    }

    pub fn with_summary(mut self, enabled: bool) -> Self {
        self.options.write_summary = enabled;
        self
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn key(&self) -> Option<&StoreKey> {
        self.key.as_ref()
    }

    pub fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    pub fn validation(&self) -> Validation {
        self.validation
    }

    /// Issue with the current local time as issue date.
    pub fn issue(&self, request: &LicenseRequest) -> LicenseResult<IssuedLicense> {
        self.issue_at(request, Local::now().naive_local())
    }

    /// Issue with an explicit issue timestamp.
    pub fn issue_at(
        &self,
        request: &LicenseRequest,
        issue_time: NaiveDateTime,
    ) -> LicenseResult<IssuedLicense> {
        let record = self.build(request, issue_time)?;

        let persisted = merge_and_persist_with(
            &self.store_path,
            &record,
            self.key.as_ref(),
            &self.options,
        )?;

        log::info!(
            "Issued license {} for {} ({} record(s) in {})",
            record.license_key,
            record.customer_name,
            persisted.records,
            persisted.path.display()
        );

        Ok(IssuedLicense { record, persisted })
    }

    /// Validate the request and build its record without touching storage.
    pub fn build(&self, request: &LicenseRequest, issue_time: NaiveDateTime) -> LicenseResult<LicenseRecord> {
        let machine = MachineIdentity::parse(&request.machine_id, self.validation)?;

        if self.scheme == KeyScheme::Randomized {
            log::warn!("The randomized key scheme is deprecated; keys cannot be recomputed");
        }

        let features = if request.features.iter().all(|f| f.trim().is_empty()) {
            self.default_features.clone()
        } else {
            request.features.clone()
        };

        match request.expiry.as_deref().map(str::trim) {
            Some(expiry) if !expiry.is_empty() => build_record(
                &machine,
                &request.customer_name,
                expiry,
                issue_time,
                features,
                self.scheme,
            ),
            _ => LicenseRecord::new(
                &machine,
                &request.customer_name,
                default_expiry(issue_time, self.validity_days)?,
                issue_time,
                features,
                self.scheme,
            ),
        }
    }
}

impl Default for Issuer {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_FILE)
    }
}
