//! Lease table
//!
//! Tracks TTL deadlines and the keys each lease owns.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use super::LeaseId;

/// A granted lease
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    pub id: LeaseId,

    /// TTL requested at grant time
    pub ttl: Duration,

    /// Clock reading when the lease ends
    pub deadline: Duration,

    /// Keys deleted when the lease ends
    pub keys: BTreeSet<String>,
}

impl LeaseRecord {
    pub fn is_expired_at(&self, now: Duration) -> bool {
        now >= self.deadline
    }

    pub fn remaining_at(&self, now: Duration) -> Duration {
        self.deadline.saturating_sub(now)
    }
}

/// All live leases of one store
#[derive(Debug)]
pub struct LeaseTable {
    leases: HashMap<LeaseId, LeaseRecord>,
    next_id: LeaseId,
}

impl Default for LeaseTable {
    fn default() -> Self {
        Self {
            leases: HashMap::new(),
            next_id: 1,
        }
    }
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lease ending `ttl` after `now`
    pub fn grant(&mut self, ttl: Duration, now: Duration) -> LeaseId {
        let id = self.next_id;
        self.next_id += 1;
        self.leases.insert(
            id,
            LeaseRecord {
                id,
                ttl,
                deadline: now.saturating_add(ttl),
                keys: BTreeSet::new(),
            },
        );
        id
    }

    pub fn get(&self, id: LeaseId) -> Option<&LeaseRecord> {
        self.leases.get(&id)
    }

    pub fn contains(&self, id: LeaseId) -> bool {
        self.leases.contains_key(&id)
    }

    /// Record that `key` now belongs to `id`
    pub fn attach(&mut self, id: LeaseId, key: &str) -> bool {
        match self.leases.get_mut(&id) {
            Some(lease) => {
                lease.keys.insert(key.to_string());
                true
            }
            None => false,
        }
    }

    /// Forget that `key` belonged to `id`
    pub fn detach(&mut self, id: LeaseId, key: &str) {
        if let Some(lease) = self.leases.get_mut(&id) {
            lease.keys.remove(key);
        }
    }

    /// Remove a lease, handing back its owned keys
    pub fn revoke(&mut self, id: LeaseId) -> Option<LeaseRecord> {
        self.leases.remove(&id)
    }

    /// Remove and return every lease whose deadline has passed
    pub fn take_expired(&mut self, now: Duration) -> Vec<LeaseRecord> {
        let expired: Vec<LeaseId> = self
            .leases
            .values()
            .filter(|lease| lease.is_expired_at(now))
            .map(|lease| lease.id)
            .collect();

        let mut records: Vec<LeaseRecord> = expired
            .into_iter()
            .filter_map(|id| self.leases.remove(&id))
            .collect();
        records.sort_by_key(|lease| lease.id);
        records
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}
