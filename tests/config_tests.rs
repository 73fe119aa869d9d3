use std::env;
use std::fs;
use std::path::PathBuf;

use serial_test::serial;
use tempfile::TempDir;

use myp_license::config::IssuerConfig;
use myp_license::encryption::StoreKey;
use myp_license::errors::LicenseError;
use myp_license::hardware::Validation;
use myp_license::issue::Issuer;
use myp_license::license_key::KeyScheme;

const ENV_VARS: &[&str] = &[
    "MYP_LICENSE_STORE_PATH",
    "MYP_LICENSE_FALLBACK_PATH",
    "MYP_LICENSE_ENCRYPTION_KEY",
    "MYP_LICENSE_REMOTE_URL",
    "MYP_LICENSE_REMOTE_TIMEOUT_SECS",
    "MYP_LICENSE_WRITE_SUMMARY",
    "MYP_LICENSE_KEY_SCHEME",
    "MYP_LICENSE_VALIDITY_DAYS",
    "MYP_LICENSE_DEFAULT_FEATURES",
    "MYP_LICENSE_STRICT_MACHINE_ID",
    "MYP_LICENSE_LOGGING_ENABLED",
    "MYP_LICENSE_LOG_LEVEL",
    "MYP_LICENSE_TEST_SECRET",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("issuer.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
#[serial]
fn explicit_file_overrides_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[store]
path = "out/licenses.json"
write_summary = false

[license]
key_scheme = "randomized"
default_validity_days = 30
default_features = ["pos", "inventory"]

[identity]
strict_validation = false
"#,
    );

    let config = IssuerConfig::load(Some(&path)).expect("config should load");

    assert_eq!(config.store.path, PathBuf::from("out/licenses.json"));
    assert!(!config.store.write_summary);
    assert_eq!(config.license.scheme().unwrap(), KeyScheme::Randomized);
    assert_eq!(config.license.default_validity_days, 30);
    assert_eq!(config.license.default_features, vec!["pos", "inventory"]);
    assert_eq!(config.identity.validation(), Validation::Lenient);
    // Untouched sections keep their defaults.
    assert_eq!(config.store.fallback_path, PathBuf::from("licenses.json"));
    assert_eq!(config.logging.level, "info");
}

#[test]
#[serial]
fn env_overrides_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[store]
path = "from-file.json"

[license]
key_scheme = "randomized"
"#,
    );

    env::set_var("MYP_LICENSE_STORE_PATH", "from-env.json");
    env::set_var("MYP_LICENSE_KEY_SCHEME", "deterministic");
    env::set_var("MYP_LICENSE_DEFAULT_FEATURES", "basic, reports");
    env::set_var("MYP_LICENSE_REMOTE_TIMEOUT_SECS", "3");

    let config = IssuerConfig::load(Some(&path)).expect("config should load");
    clear_env();

    assert_eq!(config.store.path, PathBuf::from("from-env.json"));
    assert_eq!(config.license.scheme().unwrap(), KeyScheme::Deterministic);
    assert_eq!(config.license.default_features, vec!["basic", "reports"]);
    assert_eq!(config.store.remote_timeout().as_secs(), 3);
}

#[test]
#[serial]
fn invalid_values_are_rejected_on_load() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[logging]
level = "chatty"
"#,
    );

    match IssuerConfig::load(Some(&path)) {
        Err(LicenseError::ConfigError(msg)) => assert!(msg.contains("logging.level")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
#[serial]
fn missing_explicit_file_is_an_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let result = IssuerConfig::load(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(LicenseError::ConfigError(_))));
}

#[test]
#[serial]
fn env_key_source_is_resolved() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[store]
encryption_key = "env:MYP_LICENSE_TEST_SECRET"
"#,
    );

    let key = StoreKey::generate().unwrap();
    env::set_var("MYP_LICENSE_TEST_SECRET", key.to_base64());

    let config = IssuerConfig::load(Some(&path)).unwrap();
    let resolved = config.store.encryption_key().unwrap();
    clear_env();

    assert_eq!(resolved, Some(key));
}

#[test]
#[serial]
fn issuer_from_loaded_config() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[store]
encryption_key = "a shared passphrase"
"#,
    );

    let config = IssuerConfig::load(Some(&path)).unwrap();
    let issuer = Issuer::from_config(&config).unwrap();

    assert_eq!(
        issuer.key(),
        Some(&StoreKey::from_secret("a shared passphrase").unwrap())
    );
    assert_eq!(issuer.scheme(), KeyScheme::Deterministic);
    assert_eq!(issuer.store_path(), PathBuf::from("licenses.json").as_path());
}
