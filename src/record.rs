//! License records.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{InputError, LicenseResult};
use crate::hardware::MachineIdentity;
use crate::license_key::{derive_license_key, KeyScheme};

/// Validity applied when no expiry date is given.
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// Upper bound for a configured default validity (100 years).
pub const MAX_VALIDITY_DAYS: i64 = 36_500;

/// Feature set granted when none is requested.
pub const DEFAULT_FEATURE: &str = "basic";

const EXPIRY_FORMAT: &str = "%Y-%m-%d";

lazy_static! {
    static ref EXPIRY_SHAPE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex is valid");
}

/// Timestamp stored in a record.
///
/// Older tooling wrote the expiry exactly as typed, so a stored value is not
/// guaranteed to be ISO 8601. Such values are kept verbatim and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordTime {
    Parsed(NaiveDateTime),
    Verbatim(String),
}

impl RecordTime {
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            RecordTime::Parsed(ts) => Some(*ts),
            RecordTime::Verbatim(_) => None,
        }
    }
}

impl From<NaiveDateTime> for RecordTime {
    fn from(ts: NaiveDateTime) -> Self {
        RecordTime::Parsed(ts)
    }
}

impl fmt::Display for RecordTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordTime::Parsed(ts) => f.write_str(&iso_timestamp(ts)),
            RecordTime::Verbatim(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for RecordTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.parse::<NaiveDateTime>() {
            Ok(ts) => RecordTime::Parsed(ts),
            Err(_) => {
                log::debug!("Keeping non-ISO timestamp {raw:?} as stored");
                RecordTime::Verbatim(raw)
            }
        })
    }
}

/// A single issued license.
///
/// `machine_id_hash` and `features` default when absent so stores written by
/// older tooling still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub machine_id: MachineIdentity,
    #[serde(default)]
    pub machine_id_hash: String,
    pub customer_name: String,
    pub expiry_date: RecordTime,
    pub license_key: String,
    #[serde(default)]
    pub features: Vec<String>,
    pub issue_date: RecordTime,
}

impl LicenseRecord {
    /// Build a record with an already-resolved expiry timestamp.
    ///
    /// The customer name is trimmed; the key is derived from the trimmed name.
    /// Feature names are trimmed and empty entries dropped. Timestamps are
    /// truncated to microseconds.
    pub fn new(
        machine: &MachineIdentity,
        customer_name: &str,
        expiry_date: NaiveDateTime,
        issue_time: NaiveDateTime,
        features: Vec<String>,
        scheme: KeyScheme,
    ) -> LicenseResult<Self> {
        let customer_name = customer_name.trim();
        if customer_name.is_empty() {
            return Err(InputError::InvalidCustomer.into());
        }

        Ok(Self {
            machine_id: machine.clone(),
            machine_id_hash: machine.hash(),
            customer_name: customer_name.to_string(),
            expiry_date: expiry_date.trunc_subsecs(6).into(),
            license_key: derive_license_key(machine, customer_name, scheme),
            features: normalize_features(features),
            issue_date: issue_time.trunc_subsecs(6).into(),
        })
    }

    /// True once `now` is past the expiry timestamp. An expiry that cannot
    /// be read counts as expired.
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        match self.expiry_date.as_datetime() {
            Some(expiry) => now > expiry,
            None => true,
        }
    }

    /// Human-readable summary exported next to the store.
    pub fn summary(&self) -> String {
        format!(
            "LICENSE KEY: {}\nCustomer: {}\nExpiry Date: {}\nIssue Date: {}\n",
            self.license_key, self.customer_name, self.expiry_date, self.issue_date,
        )
    }
}

/// Build a record from a `YYYY-MM-DD` expiry date.
///
/// The stored expiry is the end of that day (`23:59:59`).
pub fn build_record(
    machine: &MachineIdentity,
    customer_name: &str,
    expiry_date: &str,
    issue_time: NaiveDateTime,
    features: Vec<String>,
    scheme: KeyScheme,
) -> LicenseResult<LicenseRecord> {
    let expiry = parse_expiry(expiry_date)?;
    LicenseRecord::new(machine, customer_name, expiry, issue_time, features, scheme)
}

/// Parse a `YYYY-MM-DD` calendar date into its end-of-day timestamp.
pub fn parse_expiry(input: &str) -> LicenseResult<NaiveDateTime> {
    let trimmed = input.trim();
    let invalid = || InputError::InvalidExpiry(trimmed.to_string());

    if !EXPIRY_SHAPE.is_match(trimmed) {
        return Err(invalid().into());
    }

    let date = NaiveDate::parse_from_str(trimmed, EXPIRY_FORMAT).map_err(|_| invalid())?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).ok_or_else(invalid)?;
    Ok(date.and_time(end_of_day))
}

/// Expiry used when the caller does not supply one.
pub fn default_expiry(issue_time: NaiveDateTime, validity_days: i64) -> LicenseResult<NaiveDateTime> {
    Duration::try_days(validity_days)
        .and_then(|validity| issue_time.checked_add_signed(validity))
        .ok_or_else(|| {
            InputError::InvalidExpiry(format!("{validity_days} days after {}", iso_timestamp(&issue_time)))
                .into()
        })
}

/// ISO 8601 without offset. Fractions are written as microseconds and
/// omitted when zero.
pub fn iso_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

fn normalize_features(features: Vec<String>) -> Vec<String> {
    features
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}
