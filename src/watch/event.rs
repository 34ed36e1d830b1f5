//! Watch event definitions

use std::sync::Arc;

use crate::kv::KeyValue;

/// Kind of committed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// A committed mutation of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,

    /// Key after the mutation; for deletes only `key` and `mod_revision`
    /// are meaningful
    pub kv: KeyValue,

    /// Key before the mutation, if it existed
    pub prev_kv: Option<KeyValue>,
}

impl WatchEvent {
    pub fn put(kv: KeyValue, prev_kv: Option<KeyValue>) -> Self {
        Self {
            kind: EventKind::Put,
            kv,
            prev_kv,
        }
    }

    pub fn delete(prev: KeyValue, revision: u64) -> Self {
        let kv = KeyValue {
            key: prev.key.clone(),
            value: Vec::new(),
            create_revision: 0,
            mod_revision: revision,
            version: 0,
            lease: None,
        };
        Self {
            kind: EventKind::Delete,
            kv,
            prev_kv: Some(prev),
        }
    }

    /// Store revision at which the mutation committed
    pub fn revision(&self) -> u64 {
        self.kv.mod_revision
    }

    pub fn key(&self) -> &str {
        &self.kv.key
    }

    pub fn is_put(&self) -> bool {
        self.kind == EventKind::Put
    }
}

/// Predicate deciding, at dispatch time, whether a subscriber gets an event
pub type EventFilter = Arc<dyn Fn(&WatchEvent) -> bool + Send + Sync>;

/// Filter that accepts every event
pub fn accept_all() -> EventFilter {
    Arc::new(|_: &WatchEvent| true)
}
