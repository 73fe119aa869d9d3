//! In-memory license collection keyed by license key.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hardware::MachineIdentity;
use crate::license_key::{derive_license_key, KeyScheme};
use crate::record::LicenseRecord;

/// Mapping `license_key -> LicenseRecord`.
///
/// Serialized as a flat JSON object ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseStore {
    records: BTreeMap<String, LicenseRecord>,
}

impl LicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, license_key: &str) -> Option<&LicenseRecord> {
        self.records.get(license_key)
    }

    /// Insert under `record.license_key`, returning any record it replaced.
    pub fn insert(&mut self, record: LicenseRecord) -> Option<LicenseRecord> {
        self.records.insert(record.license_key.clone(), record)
    }

    /// Lay `other` on top of this store; entries in `other` win.
    pub fn merge(&mut self, other: LicenseStore) {
        self.records.extend(other.records);
    }

    /// Find the record issued to a machine/customer pair under the
    /// deterministic scheme.
    pub fn find(&self, machine: &MachineIdentity, customer_name: &str) -> Option<&LicenseRecord> {
        let key = derive_license_key(machine, customer_name.trim(), KeyScheme::Deterministic);
        self.get(&key)
    }

    /// All records issued to a customer, in key order.
    pub fn for_customer<'a>(
        &'a self,
        customer_name: &'a str,
    ) -> impl Iterator<Item = &'a LicenseRecord> + 'a {
        let wanted = customer_name.trim();
        self.records
            .values()
            .filter(move |r| r.customer_name == wanted)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, LicenseRecord> {
        self.records.iter()
    }
}

impl FromIterator<LicenseRecord> for LicenseStore {
    fn from_iter<I: IntoIterator<Item = LicenseRecord>>(iter: I) -> Self {
        let mut store = LicenseStore::new();
        for record in iter {
            store.insert(record);
        }
        store
    }
}

impl<'a> IntoIterator for &'a LicenseStore {
    type Item = (&'a String, &'a LicenseRecord);
    type IntoIter = btree_map::Iter<'a, String, LicenseRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
