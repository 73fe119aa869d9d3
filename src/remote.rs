//! Fetching a previously published license store.
//!
//! Some deployments publish the store at a fixed URL. Issuing can seed its
//! merge from that copy; any failure simply means starting without it.

use std::time::Duration;

use reqwest::Client;

use crate::encrypted_storage::decode_store;
use crate::encryption::StoreKey;
use crate::errors::{LicenseError, LicenseResult};
use crate::store::LicenseStore;

/// Download and decode the store published at `url`.
///
/// Transport errors and non-success statuses map to
/// [`LicenseError::NetworkUnavailable`]; decode errors pass through.
pub async fn fetch_remote_store(
    url: &str,
    key: Option<&StoreKey>,
    timeout: Duration,
) -> LicenseResult<LicenseStore> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LicenseError::NetworkUnavailable(format!("http client init failed: {e}")))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| LicenseError::NetworkUnavailable(format!("GET {url} failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(LicenseError::NetworkUnavailable(format!(
            "GET {url} returned {}",
            resp.status()
        )));
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| LicenseError::NetworkUnavailable(format!("reading body from {url} failed: {e}")))?;

    decode_store(&body, key)
}

/// Like [`fetch_remote_store`], but never fails: problems are logged and an
/// empty store is returned.
pub async fn fetch_remote_seed(url: &str, key: Option<&StoreKey>, timeout: Duration) -> LicenseStore {
    match fetch_remote_store(url, key, timeout).await {
        Ok(store) => {
            log::info!("Seeded {} license(s) from {}", store.len(), url);
            store
        }
        Err(e) => {
            log::warn!("Remote license store unavailable ({}); continuing without it", e);
            LicenseStore::new()
        }
    }
}

/// Blocking wrapper for callers outside an async runtime.
///
/// Spins up a current-thread runtime for the single request. Must not be
/// called from within a runtime.
pub fn fetch_remote_seed_blocking(url: &str, key: Option<&StoreKey>, timeout: Duration) -> LicenseStore {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::warn!("Could not start runtime for remote fetch ({}); continuing without it", e);
            return LicenseStore::new();
        }
    };

    runtime.block_on(fetch_remote_seed(url, key, timeout))
}
