//! Revisioned key-value table
//!
//! BTreeMap-based table carrying etcd-style key metadata. The table has
//! no locking of its own; the simulator owns it inside its critical
//! section.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::KeyValue;
use crate::lease::LeaseId;

/// Ordered key space plus the global revision counter
#[derive(Debug, Default)]
pub struct KvTable {
    /// Live keys, ordered lexicographically
    entries: BTreeMap<String, KeyValue>,

    /// Revision of the last committed mutation (0 = none yet)
    revision: u64,
}

impl KvTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Revision of the last committed mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, key: &str) -> Option<&KeyValue> {
        self.entries.get(key)
    }

    /// Write `value` at `key`, bumping the revision
    ///
    /// Returns the stored entry and the entry it replaced, if any.
    pub fn put(
        &mut self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> (KeyValue, Option<KeyValue>) {
        self.revision += 1;
        let revision = self.revision;

        let prev = self.entries.get(key).cloned();
        let (create_revision, version) = match &prev {
            Some(old) => (old.create_revision, old.version + 1),
            None => (revision, 1),
        };

        let kv = KeyValue {
            key: key.to_string(),
            value,
            create_revision,
            mod_revision: revision,
            version,
            lease,
        };
        self.entries.insert(key.to_string(), kv.clone());
        (kv, prev)
    }

    /// Remove `key`, bumping the revision only if it existed
    ///
    /// Returns the removed entry and the revision of the deletion.
    pub fn delete(&mut self, key: &str) -> Option<(KeyValue, u64)> {
        let prev = self.entries.remove(key)?;
        self.revision += 1;
        Some((prev, self.revision))
    }

    /// First entry under `prefix` strictly after `after` (or from the start)
    pub fn next_in_prefix(&self, prefix: &str, after: Option<&str>) -> Option<&KeyValue> {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Included(prefix),
        };
        self.entries
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(_, kv)| kv)
            .take_while(|kv| kv.key.starts_with(prefix))
            .next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
