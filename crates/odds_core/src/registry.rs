//! Odds registry: latest record per broker, full replace on every upsert.

use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::record::OddsRecord;

#[derive(Debug, Clone, Default)]
pub struct OddsRegistry {
    records: BTreeMap<String, OddsRecord>,
}

impl OddsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is stored under `record.broker`. Records without a
    /// broker key are ignored; returns whether the record was stored.
    /// Keys are trimmed here and on every lookup.
    pub fn upsert(&mut self, mut record: OddsRecord) -> bool {
        let key = record.broker.trim();
        if key.is_empty() {
            debug!("registry: dropping record without broker");
            return false;
        }
        if key.len() != record.broker.len() {
            record.broker = key.to_string();
        }
        self.records.insert(record.broker.clone(), record);
        true
    }

    /// Returns true only if something was removed.
    pub fn remove(&mut self, broker: &str) -> bool {
        self.records.remove(broker.trim()).is_some()
    }

    /// Keep only brokers listed in `ids`. Never creates entries.
    /// Returns the pruned broker ids in key order.
    pub fn sync_known_brokers<I, S>(&mut self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known: HashSet<String> = ids
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .collect();

        let stale: Vec<String> = self
            .records
            .keys()
            .filter(|k| !known.contains(*k))
            .cloned()
            .collect();

        for k in &stale {
            self.records.remove(k);
        }
        stale
    }

    pub fn get(&self, broker: &str) -> Option<&OddsRecord> {
        self.records.get(broker.trim())
    }

    /// Owned copy; callers never see internal state by reference.
    pub fn get_all(&self) -> BTreeMap<String, OddsRecord> {
        self.records.clone()
    }

    /// Records in broker order.
    pub fn records(&self) -> impl Iterator<Item = &OddsRecord> {
        self.records.values()
    }

    pub fn brokers(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn contains(&self, broker: &str) -> bool {
        self.records.contains_key(broker.trim())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
