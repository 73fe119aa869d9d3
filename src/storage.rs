//! Read-merge-write persistence of the license store.
//!
//! ## Read side
//!
//! Prior state is best effort. A missing, unreadable, undecryptable or
//! malformed store is replaced by an empty one and a warning is logged.
//!
//! ## Write side
//!
//! The merged store is encoded in memory first, then written to the target
//! path. If that write fails it is retried once at the fallback path
//! (`licenses.json` in the working directory by default). Only when both
//! fail does the caller see [`LicenseError::PersistFailed`].
//!
//! A plain-text summary for the customer is written next to the store. It is
//! a convenience export; failures are logged and otherwise ignored.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::encrypted_storage::{decode_store, encode_store};
use crate::encryption::StoreKey;
use crate::errors::{LicenseError, LicenseResult};
use crate::record::LicenseRecord;
use crate::store::LicenseStore;

/// Store file name used for the fallback location.
pub const DEFAULT_STORE_FILE: &str = "licenses.json";

/// Suffix appended to customer summary files.
const SUMMARY_SUFFIX: &str = "_license.txt";

/// Knobs for [`merge_and_persist_with`].
#[derive(Debug, Clone)]
pub struct PersistOptions {
    /// Where to write when the primary path fails.
    pub fallback_path: PathBuf,
    /// Store laid underneath the local one before merging (e.g. a published
    /// remote copy). Local entries win over seed entries.
    pub seed: Option<LicenseStore>,
    /// Write the per-customer summary file.
    pub write_summary: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            fallback_path: PathBuf::from(DEFAULT_STORE_FILE),
            seed: None,
            write_summary: true,
        }
    }
}

/// Outcome of a successful merge-and-persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistResult {
    /// Path the store was actually written to.
    pub path: PathBuf,
    /// True when the primary path failed and the fallback was used.
    pub used_fallback: bool,
    /// Number of records in the written store.
    pub records: usize,
    /// True when an existing record with the same key was overwritten.
    pub replaced: bool,
    /// Summary file, if one was written.
    pub summary_path: Option<PathBuf>,
}

/// Load the store at `path`, substituting an empty store on any failure.
pub fn load_store(path: &Path, key: Option<&StoreKey>) -> LicenseStore {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No existing license store at {}", path.display());
            return LicenseStore::new();
        }
        Err(e) => {
            log::warn!(
                "Could not read license store at {}: {}; starting from an empty store",
                path.display(),
                e
            );
            return LicenseStore::new();
        }
    };

    match decode_store(&bytes, key) {
        Ok(store) => {
            log::debug!("Loaded {} license(s) from {}", store.len(), path.display());
            store
        }
        Err(e) => {
            log::warn!(
                "Ignoring existing license store at {}: {}; starting from an empty store",
                path.display(),
                e
            );
            LicenseStore::new()
        }
    }
}

/// Merge `record` into the store at `path` and write it back.
///
/// Uses the default fallback location and writes the customer summary.
pub fn merge_and_persist(
    path: &Path,
    record: &LicenseRecord,
    key: Option<&StoreKey>,
) -> LicenseResult<PersistResult> {
    merge_and_persist_with(path, record, key, &PersistOptions::default())
}

/// Merge `record` into the store at `path` and write it back.
pub fn merge_and_persist_with(
    path: &Path,
    record: &LicenseRecord,
    key: Option<&StoreKey>,
    options: &PersistOptions,
) -> LicenseResult<PersistResult> {
    let mut store = options.seed.clone().unwrap_or_default();
    store.merge(load_store(path, key));

    let replaced = store.insert(record.clone()).is_some();
    if replaced {
        log::info!("Overwriting existing license {}", record.license_key);
    }

    let bytes = encode_store(&store, key)?;
    let (written, used_fallback) = write_with_fallback(path, &options.fallback_path, &bytes)?;

    let summary_path = if options.write_summary {
        let dir = parent_dir(&written);
        match write_summary(&dir, record) {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("Skipping customer summary for {}: {}", record.customer_name, e);
                None
            }
        }
    } else {
        None
    };

    Ok(PersistResult {
        path: written,
        used_fallback,
        records: store.len(),
        replaced,
        summary_path,
    })
}

/// Write `bytes` to `path`, retrying once at `fallback`.
fn write_with_fallback(path: &Path, fallback: &Path, bytes: &[u8]) -> LicenseResult<(PathBuf, bool)> {
    let primary_err = match fs::write(path, bytes) {
        Ok(()) => {
            log::debug!("Wrote license store to {}", path.display());
            return Ok((path.to_path_buf(), false));
        }
        Err(e) => e,
    };

    if fallback == path {
        return Err(LicenseError::PersistFailed(format!(
            "{}: {}",
            path.display(),
            primary_err
        )));
    }

    log::warn!(
        "Could not write license store to {}: {}; retrying at {}",
        path.display(),
        primary_err,
        fallback.display()
    );

    match fs::write(fallback, bytes) {
        Ok(()) => Ok((fallback.to_path_buf(), true)),
        Err(fallback_err) => Err(LicenseError::PersistFailed(format!(
            "{}: {}; fallback {}: {}",
            path.display(),
            primary_err,
            fallback.display(),
            fallback_err
        ))),
    }
}

/// Summary file name for a customer: whitespace and path separators become `_`.
pub fn summary_file_name(customer_name: &str) -> String {
    let stem: String = customer_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("{stem}{SUMMARY_SUFFIX}")
}

/// Write the customer summary into `dir`.
pub fn write_summary(dir: &Path, record: &LicenseRecord) -> LicenseResult<PathBuf> {
    let path = dir.join(summary_file_name(&record.customer_name));
    fs::write(&path, record.summary())?;
    log::debug!("Wrote customer summary to {}", path.display());
    Ok(path)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_file_name_replaces_separators() {
        assert_eq!(summary_file_name("Acme Corp"), "Acme_Corp_license.txt");
        assert_eq!(summary_file_name(" Big  Co "), "Big__Co_license.txt");
        assert_eq!(summary_file_name("a/b\\c"), "a_b_c_license.txt");
    }

    #[test]
    fn parent_dir_defaults_to_cwd() {
        assert_eq!(parent_dir(Path::new("licenses.json")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("out/licenses.json")), PathBuf::from("out"));
    }

    #[test]
    fn missing_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_store(&dir.path().join("absent.json"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn unreadable_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file.
        let store = load_store(dir.path(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn write_fails_when_primary_equals_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("file.txt");
        fs::write(&blocked, "x").unwrap();
        let target = blocked.join("licenses.json");

        let result = write_with_fallback(&target, &target, b"{}");
        assert!(matches!(result, Err(LicenseError::PersistFailed(_))));
    }
}
