//! Configuration for the license issuer.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. Explicit config file (`--config`), otherwise `license_generator.toml`
//!    in the working directory, otherwise the same file under the user
//!    config directory (e.g. `~/.config/myp-license/`)
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `MYP_LICENSE_STORE_PATH` - License store file
//! - `MYP_LICENSE_FALLBACK_PATH` - Where to write if the store path fails
//! - `MYP_LICENSE_ENCRYPTION_KEY` - Store key (literal, `env:VAR` or `keyring:ACCOUNT`)
//! - `MYP_LICENSE_REMOTE_URL` - Published store used to seed merges
//! - `MYP_LICENSE_REMOTE_TIMEOUT_SECS` - Timeout for the remote fetch
//! - `MYP_LICENSE_WRITE_SUMMARY` - Write per-customer summary files
//! - `MYP_LICENSE_KEY_SCHEME` - `deterministic` or `randomized`
//! - `MYP_LICENSE_VALIDITY_DAYS` - Validity when no expiry is given
//! - `MYP_LICENSE_DEFAULT_FEATURES` - Comma-separated default features
//! - `MYP_LICENSE_STRICT_MACHINE_ID` - Require hex pairs in machine ids
//! - `MYP_LICENSE_LOGGING_ENABLED` - Enable logging
//! - `MYP_LICENSE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::Config;
use serde::Deserialize;

use crate::encryption::StoreKey;
use crate::errors::{LicenseError, LicenseResult};
use crate::hardware::Validation;
use crate::license_key::{parse_scheme, KeyScheme};
use crate::record::{DEFAULT_FEATURE, DEFAULT_VALIDITY_DAYS, MAX_VALIDITY_DAYS};
use crate::storage::DEFAULT_STORE_FILE;

/// Base name of the optional config file.
pub const CONFIG_FILE_NAME: &str = "license_generator";

/// Keyring service holding store keys referenced as `keyring:ACCOUNT`.
pub const KEYRING_SERVICE: &str = "myp-license";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// License store configuration
    pub store: StoreConfig,
    /// License issuing configuration
    pub license: LicenseConfig,
    /// Machine identifier handling
    pub identity: IdentityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// License store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store file
    pub path: PathBuf,
    /// Fallback file used when writing `path` fails
    pub fallback_path: PathBuf,
    /// Store key source; empty disables encryption
    pub encryption_key: String,
    /// Published store used to seed merges; empty disables the fetch
    pub remote_url: String,
    /// Timeout for the remote fetch in seconds
    pub remote_timeout_secs: u64,
    /// Write `<customer>_license.txt` next to the store
    pub write_summary: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_FILE),
            fallback_path: PathBuf::from(DEFAULT_STORE_FILE),
            encryption_key: String::new(),
            remote_url: String::new(),
            remote_timeout_secs: 10,
            write_summary: true,
        }
    }
}

/// License issuing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// `deterministic` (default) or `randomized`
    pub key_scheme: String,
    /// Validity applied when no expiry date is given
    pub default_validity_days: i64,
    /// Features granted when none are requested
    pub default_features: Vec<String>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_scheme: KeyScheme::Deterministic.to_string(),
            default_validity_days: DEFAULT_VALIDITY_DAYS,
            default_features: vec![DEFAULT_FEATURE.to_string()],
        }
    }
}

/// Machine identifier handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Require each group of a machine id to be two hex digits
    pub strict_validation: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            strict_validation: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

fn cfg_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl IssuerConfig {
    /// Load configuration from defaults, a config file and the environment.
    ///
    /// `file` must exist when given; the implicit config files are optional.
    pub fn load(file: Option<&Path>) -> LicenseResult<Self> {
        let mut builder = Config::builder()
            // Start with defaults
            .set_default("store.path", DEFAULT_STORE_FILE)
            .map_err(cfg_err)?
            .set_default("store.fallback_path", DEFAULT_STORE_FILE)
            .map_err(cfg_err)?
            .set_default("store.encryption_key", "")
            .map_err(cfg_err)?
            .set_default("store.remote_url", "")
            .map_err(cfg_err)?
            .set_default("store.remote_timeout_secs", 10)
            .map_err(cfg_err)?
            .set_default("store.write_summary", true)
            .map_err(cfg_err)?
            .set_default("license.key_scheme", KeyScheme::Deterministic.as_str())
            .map_err(cfg_err)?
            .set_default("license.default_validity_days", DEFAULT_VALIDITY_DAYS)
            .map_err(cfg_err)?
            .set_default("license.default_features", vec![DEFAULT_FEATURE.to_string()])
            .map_err(cfg_err)?
            .set_default("identity.strict_validation", true)
            .map_err(cfg_err)?
            .set_default("logging.enabled", true)
            .map_err(cfg_err)?
            .set_default("logging.level", "info")
            .map_err(cfg_err)?;

        builder = match file {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => {
                if let Some(dir) = dirs::config_dir() {
                    let user_file = dir.join(KEYRING_SERVICE).join(CONFIG_FILE_NAME);
                    builder = builder.add_source(config::File::from(user_file).required(false));
                }
                builder.add_source(config::File::with_name(CONFIG_FILE_NAME).required(false))
            }
        };

        let features = env::var("MYP_LICENSE_DEFAULT_FEATURES").ok().map(|v| {
            v.split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect::<Vec<String>>()
        });

        // Override with environment variables
        let builder = builder
            .set_override_option("store.path", env::var("MYP_LICENSE_STORE_PATH").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "store.fallback_path",
                env::var("MYP_LICENSE_FALLBACK_PATH").ok(),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "store.encryption_key",
                env::var("MYP_LICENSE_ENCRYPTION_KEY").ok(),
            )
            .map_err(cfg_err)?
            .set_override_option("store.remote_url", env::var("MYP_LICENSE_REMOTE_URL").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "store.remote_timeout_secs",
                env_parsed::<i64>("MYP_LICENSE_REMOTE_TIMEOUT_SECS"),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "store.write_summary",
                env_parsed::<bool>("MYP_LICENSE_WRITE_SUMMARY"),
            )
            .map_err(cfg_err)?
            .set_override_option("license.key_scheme", env::var("MYP_LICENSE_KEY_SCHEME").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "license.default_validity_days",
                env_parsed::<i64>("MYP_LICENSE_VALIDITY_DAYS"),
            )
            .map_err(cfg_err)?
            .set_override_option("license.default_features", features)
            .map_err(cfg_err)?
            .set_override_option(
                "identity.strict_validation",
                env_parsed::<bool>("MYP_LICENSE_STRICT_MACHINE_ID"),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("MYP_LICENSE_LOGGING_ENABLED"),
            )
            .map_err(cfg_err)?
            .set_override_option("logging.level", env::var("MYP_LICENSE_LOG_LEVEL").ok())
            .map_err(cfg_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        let config: IssuerConfig = settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.store.path.as_os_str().is_empty() {
            return Err(LicenseError::ConfigError(
                "store.path cannot be empty".to_string(),
            ));
        }
        if self.store.fallback_path.as_os_str().is_empty() {
            return Err(LicenseError::ConfigError(
                "store.fallback_path cannot be empty".to_string(),
            ));
        }
        if self.store.remote_timeout_secs == 0 {
            return Err(LicenseError::ConfigError(
                "store.remote_timeout_secs must be greater than 0".to_string(),
            ));
        }

        parse_scheme(&self.license.key_scheme)?;

        if !(1..=MAX_VALIDITY_DAYS).contains(&self.license.default_validity_days) {
            return Err(LicenseError::ConfigError(format!(
                "license.default_validity_days must be between 1 and {MAX_VALIDITY_DAYS}"
            )));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

impl StoreConfig {
    /// Resolve the configured store key.
    ///
    /// - empty: no encryption
    /// - `env:NAME`: read from environment variable `NAME`
    /// - `keyring:ACCOUNT`: read from the OS keyring (service `myp-license`)
    /// - anything else: the secret itself (see [`StoreKey::from_secret`])
    pub fn encryption_key(&self) -> LicenseResult<Option<StoreKey>> {
        let source = self.encryption_key.trim();
        if source.is_empty() {
            return Ok(None);
        }

        let secret = if let Some(var) = source.strip_prefix("env:") {
            env::var(var).map_err(|_| {
                LicenseError::ConfigError(format!(
                    "store.encryption_key refers to unset environment variable '{var}'"
                ))
            })?
        } else if let Some(account) = source.strip_prefix("keyring:") {
            load_key_from_keyring(account)?
        } else {
            source.to_string()
        };

        StoreKey::from_secret(&secret).map(Some)
    }

    pub fn remote_url(&self) -> Option<&str> {
        let url = self.remote_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

impl LicenseConfig {
    pub fn scheme(&self) -> LicenseResult<KeyScheme> {
        parse_scheme(&self.key_scheme)
    }
}

impl IdentityConfig {
    pub fn validation(&self) -> Validation {
        if self.strict_validation {
            Validation::Strict
        } else {
            Validation::Lenient
        }
    }
}

impl LoggingConfig {
    /// Filter string for the logger.
    pub fn filter(&self) -> String {
        if self.enabled {
            self.level.to_lowercase()
        } else {
            "off".to_string()
        }
    }
}

/// Read a store key secret from the OS keyring.
fn load_key_from_keyring(account: &str) -> LicenseResult<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, account)
        .map_err(|e| LicenseError::ConfigError(format!("keyring entry '{account}': {e}")))?;
    entry
        .get_password()
        .map_err(|e| LicenseError::ConfigError(format!("keyring entry '{account}': {e}")))
}
