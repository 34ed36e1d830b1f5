//! In-memory coordination store
//!
//! Reproduces the store guarantees the model layer relies on: monotonic
//! revisions, atomic create-if-absent locking, lease expiry that deletes
//! owned keys, and revision-ordered watch delivery.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::{Clock, KeyValue, KvRange, KvStore, KvTable, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lease::{LeaseId, LeaseTable, Reaper};
use crate::watch::{EventFilter, WatchDispatcher, WatchEvent, WatchStream};

/// Everything guarded by the store-wide critical section
struct StoreState {
    table: KvTable,
    leases: LeaseTable,
}

impl StoreState {
    /// Commit a put and publish its event
    fn put(
        &mut self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
        dispatcher: &WatchDispatcher,
    ) -> Result<KeyValue> {
        if let Some(id) = lease {
            if !self.leases.contains(id) {
                return Err(Error::LeaseNotFound(id));
            }
        }

        let (kv, prev) = self.table.put(key, value, lease);

        if let Some(old_lease) = prev.as_ref().and_then(|old| old.lease) {
            if Some(old_lease) != lease {
                self.leases.detach(old_lease, key);
            }
        }
        if let Some(id) = lease {
            self.leases.attach(id, key);
        }

        tracing::debug!("put {} at revision {}", key, kv.mod_revision);
        dispatcher.dispatch(&WatchEvent::put(kv.clone(), prev));
        Ok(kv)
    }

    /// Commit a delete and publish its event; `None` when the key is absent
    fn delete(&mut self, key: &str, dispatcher: &WatchDispatcher) -> Option<u64> {
        let (prev, revision) = self.table.delete(key)?;

        if let Some(id) = prev.lease {
            self.leases.detach(id, key);
        }

        tracing::debug!("delete {} at revision {}", key, revision);
        dispatcher.dispatch(&WatchEvent::delete(prev, revision));
        Some(revision)
    }

    /// Drop a lease and every key it still owns; returns keys deleted
    fn end_lease(&mut self, id: LeaseId, dispatcher: &WatchDispatcher) -> Option<usize> {
        let record = self.leases.revoke(id)?;
        let mut deleted = 0;
        for key in &record.keys {
            if self.delete(key, dispatcher).is_some() {
                deleted += 1;
            }
        }
        Some(deleted)
    }

    /// End every lease whose deadline has passed; returns keys deleted
    fn reap(&mut self, now: Duration, dispatcher: &WatchDispatcher) -> usize {
        let expired = self.leases.take_expired(now);
        let mut deleted = 0;

        for record in expired {
            for key in &record.keys {
                if self.delete(key, dispatcher).is_some() {
                    deleted += 1;
                }
            }
            tracing::debug!(
                "Lease {} expired (ttl {:?}), released {} key(s)",
                record.id,
                record.ttl,
                record.keys.len()
            );
        }

        deleted
    }
}

struct Shared {
    state: Mutex<StoreState>,

    /// Signalled whenever a key is deleted, so lock pollers retry early
    released: Condvar,

    dispatcher: Arc<WatchDispatcher>,
    clock: Arc<dyn Clock>,
    lock_poll_interval: Duration,

    /// Stops the background reaper when the store goes away
    reaper: Mutex<Option<Reaper>>,
}

impl Shared {
    /// Enter the critical section, expiring due leases first
    fn enter(&self) -> MutexGuard<'_, StoreState> {
        let mut state = self.state.lock();
        self.reap_locked(&mut state);
        state
    }

    fn reap_locked(&self, state: &mut StoreState) -> usize {
        let deleted = state.reap(self.clock.now(), &self.dispatcher);
        if deleted > 0 {
            self.released.notify_all();
        }
        deleted
    }
}

/// In-memory coordination store
///
/// A cheap cloneable handle; all clones share one key space. Build a
/// fresh simulator per test to keep tests isolated.
///
/// ## Concurrency:
/// - `state`: one Mutex serializes every read, mutation, lock attempt and
///   expiry pass
/// - watch events are enqueued while that Mutex is held
/// - expired leases are reaped on entry to every operation, and by the
///   optional background reaper thread
#[derive(Clone)]
pub struct Simulator {
    shared: Arc<Shared>,
}

impl Simulator {
    /// Simulator on the system clock with a 100 ms background reaper
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Simulator using the reaper and polling intervals of `config`
    pub fn with_config(config: &Config) -> Self {
        Self::builder()
            .reap_interval(config.lease_reap_interval())
            .lock_poll_interval(config.lock_poll_interval())
            .build()
    }

    pub fn builder() -> SimulatorBuilder {
        SimulatorBuilder::default()
    }

    /// Wrap this simulator as a shared `Store` handle
    pub fn into_store(self) -> super::Store {
        Arc::new(self)
    }

    /// Run one expiry pass now; returns the number of keys deleted
    pub fn expire_leases(&self) -> usize {
        let mut state = self.shared.state.lock();
        self.shared.reap_locked(&mut state)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.shared.clock)
    }

    pub fn key_count(&self) -> usize {
        self.shared.enter().table.len()
    }

    pub fn lease_count(&self) -> usize {
        self.shared.enter().leases.len()
    }

    pub fn watch_count(&self) -> usize {
        self.shared.dispatcher.subscription_count()
    }

    /// Whether the background reaper thread is running
    pub fn has_reaper(&self) -> bool {
        self.shared
            .reaper
            .lock()
            .as_ref()
            .map(Reaper::is_running)
            .unwrap_or(false)
    }

    /// Concrete lazy range, restartable through `RangeIter::restart`
    pub fn range_iter(&self, prefix: &str) -> RangeIter {
        RangeIter {
            shared: Arc::clone(&self.shared),
            prefix: prefix.to_string(),
            cursor: None,
            done: false,
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for Simulator {
    fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        Ok(self.shared.enter().table.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        let mut state = self.shared.enter();
        let kv = state.put(key, value, None, &self.shared.dispatcher)?;
        Ok(kv.mod_revision)
    }

    fn put_with_lease(&self, key: &str, value: Vec<u8>, lease: LeaseId) -> Result<u64> {
        let mut state = self.shared.enter();
        let kv = state.put(key, value, Some(lease), &self.shared.dispatcher)?;
        Ok(kv.mod_revision)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.shared.enter();
        let deleted = state.delete(key, &self.shared.dispatcher).is_some();
        if deleted {
            self.shared.released.notify_all();
        }
        Ok(deleted)
    }

    fn range(&self, prefix: &str) -> Result<KvRange> {
        Ok(Box::new(self.range_iter(prefix)))
    }

    fn grant_lease(&self, ttl: Duration) -> Result<LeaseId> {
        let mut state = self.shared.enter();
        let id = state.leases.grant(ttl, self.shared.clock.now());
        tracing::debug!("Lease {} granted (ttl {:?})", id, ttl);
        Ok(id)
    }

    fn revoke_lease(&self, lease: LeaseId) -> Result<bool> {
        let mut state = self.shared.enter();
        match state.end_lease(lease, &self.shared.dispatcher) {
            Some(deleted) => {
                if deleted > 0 {
                    self.shared.released.notify_all();
                }
                tracing::debug!("Lease {} revoked, released {} key(s)", lease, deleted);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn lease_time_to_live(&self, lease: LeaseId) -> Result<Option<Duration>> {
        let state = self.shared.enter();
        let now = self.shared.clock.now();
        Ok(state.leases.get(lease).map(|record| record.remaining_at(now)))
    }

    fn lock(&self, key: &str, lease: LeaseId, timeout: Duration) -> Result<bool> {
        let clock = &self.shared.clock;
        // Overflow (e.g. Duration::MAX) means wait forever
        let deadline = clock.now().checked_add(timeout);
        let mut state = self.shared.enter();

        loop {
            if !state.leases.contains(lease) {
                tracing::debug!("Lock {} not attempted: lease {} is gone", key, lease);
                return Ok(false);
            }

            match state.table.get(key).map(|kv| kv.lease) {
                None => {
                    let value = lease.to_string().into_bytes();
                    state.put(key, value, Some(lease), &self.shared.dispatcher)?;
                    tracing::debug!("Lock {} acquired under lease {}", key, lease);
                    return Ok(true);
                }
                Some(Some(owner)) if owner == lease => return Ok(true),
                Some(_) => {}
            }

            let now = clock.now();
            let wait = match deadline {
                Some(deadline) if now >= deadline => {
                    tracing::debug!("Lock {} busy, giving up after {:?}", key, timeout);
                    return Ok(false);
                }
                Some(deadline) => (deadline - now).min(self.shared.lock_poll_interval),
                None => self.shared.lock_poll_interval,
            };

            self.shared.released.wait_for(&mut state, wait);
            self.shared.reap_locked(&mut state);
        }
    }

    fn unlock(&self, key: &str, lease: LeaseId) -> Result<bool> {
        let mut state = self.shared.enter();
        let owned = state
            .table
            .get(key)
            .map(|kv| kv.lease == Some(lease))
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }

        state.delete(key, &self.shared.dispatcher);
        self.shared.released.notify_all();
        tracing::debug!("Lock {} released by lease {}", key, lease);
        Ok(true)
    }

    fn watch(&self, prefix: &str, filter: EventFilter) -> Result<WatchStream> {
        // Subscribe inside the critical section so the stream starts
        // exactly at the current revision
        let _state = self.shared.enter();
        Ok(self.shared.dispatcher.subscribe(prefix, filter))
    }

    fn current_revision(&self) -> Result<u64> {
        Ok(self.shared.enter().table.revision())
    }
}

/// Lazy key-ordered iteration over one prefix
///
/// Each step enters the critical section and resumes after the last key
/// returned, so keys deleted mid-iteration are skipped and the sequence
/// always terminates.
#[derive(Clone)]
pub struct RangeIter {
    shared: Arc<Shared>,
    prefix: String,
    cursor: Option<String>,
    done: bool,
}

impl RangeIter {
    /// Start again from the first key of the prefix
    pub fn restart(&mut self) {
        self.cursor = None;
        self.done = false;
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Iterator for RangeIter {
    type Item = KeyValue;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let next = {
            let state = self.shared.enter();
            state
                .table
                .next_in_prefix(&self.prefix, self.cursor.as_deref())
                .cloned()
        };

        match next {
            Some(kv) => {
                self.cursor = Some(kv.key.clone());
                Some(kv)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Builder for Simulator
pub struct SimulatorBuilder {
    clock: Arc<dyn Clock>,
    reap_interval: Option<Duration>,
    lock_poll_interval: Duration,
}

impl Default for SimulatorBuilder {
    fn default() -> Self {
        let config = Config::default();
        Self {
            clock: Arc::new(SystemClock::new()),
            reap_interval: config.lease_reap_interval(),
            lock_poll_interval: config.lock_poll_interval(),
        }
    }
}

impl SimulatorBuilder {
    /// Use `clock` for lease deadlines and lock timeouts
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Background expiry period; `None` reaps only lazily
    pub fn reap_interval(mut self, interval: Option<Duration>) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Retry interval for timed lock acquisition
    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn build(self) -> Simulator {
        let shared = Arc::new(Shared {
            state: Mutex::new(StoreState {
                table: KvTable::new(),
                leases: LeaseTable::new(),
            }),
            released: Condvar::new(),
            dispatcher: WatchDispatcher::new(),
            clock: self.clock,
            lock_poll_interval: self.lock_poll_interval,
            reaper: Mutex::new(None),
        });

        if let Some(interval) = self.reap_interval {
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            let spawned = Reaper::spawn(interval, move || match weak.upgrade() {
                Some(shared) => {
                    let mut state = shared.state.lock();
                    shared.reap_locked(&mut state);
                    true
                }
                None => false,
            });

            match spawned {
                Ok(reaper) => *shared.reaper.lock() = Some(reaper),
                // Lazy expiry on every operation still applies
                Err(e) => tracing::warn!("Failed to start lease reaper: {}", e),
            }
        }

        Simulator { shared }
    }
}
