//! Tests for store locks and the Lock guard
//!
//! These tests verify:
//! - Create-if-absent semantics of `lock` / `unlock`
//! - Zero, bounded and unbounded lock timeouts
//! - Guard release on drop, on `release`, and on lease expiry

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use etcd3_model::kv::{KeyValue, KvRange, KvStore, ManualClock, Simulator};
use etcd3_model::lease::LeaseId;
use etcd3_model::watch::{EventFilter, WatchStream};
use etcd3_model::{Error, Lock, Result, Store};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store() -> (Simulator, Store) {
    let sim = Simulator::builder()
        .reap_interval(None)
        .lock_poll_interval(Duration::from_millis(5))
        .build();
    let store = sim.clone().into_store();
    (sim, store)
}

fn setup_manual_store() -> (Arc<ManualClock>, Simulator, Store) {
    let clock = Arc::new(ManualClock::new());
    let sim = Simulator::builder()
        .clock(clock.clone())
        .reap_interval(None)
        .build();
    let store = sim.clone().into_store();
    (clock, sim, store)
}

const TTL: Duration = Duration::from_secs(30);

/// Simulator whose `unlock` always fails
struct UnlockFails {
    inner: Simulator,
}

impl KvStore for UnlockFails {
    fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        self.inner.put(key, value)
    }

    fn put_with_lease(&self, key: &str, value: Vec<u8>, lease: LeaseId) -> Result<u64> {
        self.inner.put_with_lease(key, value, lease)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key)
    }

    fn range(&self, prefix: &str) -> Result<KvRange> {
        self.inner.range(prefix)
    }

    fn grant_lease(&self, ttl: Duration) -> Result<LeaseId> {
        self.inner.grant_lease(ttl)
    }

    fn revoke_lease(&self, lease: LeaseId) -> Result<bool> {
        self.inner.revoke_lease(lease)
    }

    fn lease_time_to_live(&self, lease: LeaseId) -> Result<Option<Duration>> {
        self.inner.lease_time_to_live(lease)
    }

    fn lock(&self, key: &str, lease: LeaseId, timeout: Duration) -> Result<bool> {
        self.inner.lock(key, lease, timeout)
    }

    fn unlock(&self, _key: &str, _lease: LeaseId) -> Result<bool> {
        Err(Error::BackendUnavailable("unlock rejected".to_string()))
    }

    fn watch(&self, prefix: &str, filter: EventFilter) -> Result<WatchStream> {
        self.inner.watch(prefix, filter)
    }

    fn current_revision(&self) -> Result<u64> {
        self.inner.current_revision()
    }
}

// =============================================================================
// Store Lock Tests
// =============================================================================

#[test]
fn test_lock_creates_key_owned_by_lease() {
    let (sim, _store) = setup_store();
    let lease = sim.grant_lease(TTL).unwrap();

    assert!(sim.lock("/k/lock", lease, Duration::ZERO).unwrap());

    let kv = sim.get("/k/lock").unwrap().unwrap();
    assert_eq!(kv.lease, Some(lease));
}

#[test]
fn test_lock_fails_while_other_lease_holds() {
    let (sim, _store) = setup_store();
    let first = sim.grant_lease(TTL).unwrap();
    let second = sim.grant_lease(TTL).unwrap();

    assert!(sim.lock("/k/lock", first, Duration::ZERO).unwrap());
    assert!(!sim.lock("/k/lock", second, Duration::ZERO).unwrap());
}

#[test]
fn test_relock_under_same_lease_succeeds() {
    let (sim, _store) = setup_store();
    let lease = sim.grant_lease(TTL).unwrap();

    assert!(sim.lock("/k/lock", lease, Duration::ZERO).unwrap());
    let revision = sim.current_revision().unwrap();
    assert!(sim.lock("/k/lock", lease, Duration::ZERO).unwrap());
    assert_eq!(sim.current_revision().unwrap(), revision);
}

#[test]
fn test_lock_with_dead_lease_fails() {
    let (sim, _store) = setup_store();
    let lease = sim.grant_lease(TTL).unwrap();
    sim.revoke_lease(lease).unwrap();

    assert!(!sim.lock("/k/lock", lease, Duration::ZERO).unwrap());
    assert_eq!(sim.get("/k/lock").unwrap(), None);
}

#[test]
fn test_lock_over_plain_key_fails() {
    let (sim, _store) = setup_store();
    sim.put("/k/lock", Vec::new()).unwrap();
    let lease = sim.grant_lease(TTL).unwrap();

    assert!(!sim.lock("/k/lock", lease, Duration::ZERO).unwrap());
}

#[test]
fn test_unlock_only_by_owner() {
    let (sim, _store) = setup_store();
    let owner = sim.grant_lease(TTL).unwrap();
    let other = sim.grant_lease(TTL).unwrap();
    sim.lock("/k/lock", owner, Duration::ZERO).unwrap();

    assert!(!sim.unlock("/k/lock", other).unwrap());
    assert!(sim.get("/k/lock").unwrap().is_some());

    assert!(sim.unlock("/k/lock", owner).unwrap());
    assert!(!sim.unlock("/k/lock", owner).unwrap());
    assert_eq!(sim.get("/k/lock").unwrap(), None);
}

#[test]
fn test_bounded_timeout_gives_up() {
    let (sim, _store) = setup_store();
    let holder = sim.grant_lease(TTL).unwrap();
    let waiter = sim.grant_lease(TTL).unwrap();
    sim.lock("/k/lock", holder, Duration::ZERO).unwrap();

    let started = Instant::now();
    assert!(!sim.lock("/k/lock", waiter, Duration::from_millis(50)).unwrap());
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_unbounded_timeout_waits_for_unlock() {
    let (sim, _store) = setup_store();
    let holder = sim.grant_lease(TTL).unwrap();
    let waiter = sim.grant_lease(TTL).unwrap();
    sim.lock("/k/lock", holder, Duration::ZERO).unwrap();

    let handle = {
        let sim = sim.clone();
        thread::spawn(move || sim.lock("/k/lock", waiter, Duration::MAX).unwrap())
    };

    thread::sleep(Duration::from_millis(30));
    sim.unlock("/k/lock", holder).unwrap();

    assert!(handle.join().unwrap());
    assert_eq!(sim.get("/k/lock").unwrap().unwrap().lease, Some(waiter));
}

#[test]
fn test_waiter_acquires_after_holder_lease_expires() {
    let sim = Simulator::builder()
        .reap_interval(None)
        .lock_poll_interval(Duration::from_millis(5))
        .build();
    let holder = sim.grant_lease(Duration::from_millis(40)).unwrap();
    let waiter = sim.grant_lease(TTL).unwrap();
    sim.lock("/k/lock", holder, Duration::ZERO).unwrap();

    // No reaper: the polling waiter itself expires the holder
    assert!(sim.lock("/k/lock", waiter, Duration::from_secs(5)).unwrap());
}

// =============================================================================
// Lock Guard Tests
// =============================================================================

#[test]
fn test_guard_acquires_and_releases_on_drop() {
    let (sim, store) = setup_store();

    {
        let lock = Lock::acquire(&store, "/g/lock", TTL, Duration::ZERO).unwrap();
        assert!(lock.is_acquired());
        assert_eq!(lock.key(), "/g/lock");
        assert_eq!(lock.ttl(), TTL);
        assert_eq!(sim.lease_count(), 1);
    }

    assert_eq!(sim.get("/g/lock").unwrap(), None);
    assert_eq!(sim.lease_count(), 0);
}

#[test]
fn test_failed_guard_still_revokes_its_lease() {
    let (sim, store) = setup_store();
    let held = Lock::acquire(&store, "/g/lock", TTL, Duration::ZERO).unwrap();

    {
        let busy = Lock::acquire(&store, "/g/lock", TTL, Duration::ZERO).unwrap();
        assert!(!busy.is_acquired());
        assert_eq!(sim.lease_count(), 2);
    }

    assert_eq!(sim.lease_count(), 1);
    assert!(held.is_acquired());
}

#[test]
fn test_release_is_idempotent() {
    let (sim, store) = setup_store();
    let mut lock = Lock::acquire(&store, "/g/lock", TTL, Duration::ZERO).unwrap();

    assert!(lock.release().unwrap());
    assert!(!lock.is_acquired());
    assert!(!lock.release().unwrap());
    assert_eq!(sim.get("/g/lock").unwrap(), None);
}

#[test]
fn test_failed_unlock_still_revokes_lease() {
    let (sim, _store) = setup_store();
    let store: Store = Arc::new(UnlockFails { inner: sim.clone() });

    let mut lock = Lock::acquire(&store, "/g/lock", TTL, Duration::ZERO).unwrap();
    assert!(lock.is_acquired());

    assert!(matches!(lock.release(), Err(Error::BackendUnavailable(_))));

    // The revoked lease took the lock key with it
    assert_eq!(sim.lease_count(), 0);
    assert_eq!(sim.get("/g/lock").unwrap(), None);
    assert!(!lock.release().unwrap());
}

#[test]
fn test_guard_released_on_early_return() {
    fn fails_while_locked(store: &Store) -> etcd3_model::Result<()> {
        let lock = Lock::acquire(store, "/g/lock", TTL, Duration::ZERO)?;
        assert!(lock.is_acquired());
        Err(etcd3_model::Error::InvalidMessage)
    }

    let (sim, store) = setup_store();
    assert!(fails_while_locked(&store).is_err());
    assert_eq!(sim.get("/g/lock").unwrap(), None);
}

#[test]
fn test_guard_expires_with_its_lease() {
    let (clock, sim, store) = setup_manual_store();
    let lock = Lock::acquire(&store, "/g/lock", Duration::from_secs(2), Duration::ZERO).unwrap();
    assert!(lock.is_acquired());
    assert_eq!(store.lease_time_to_live(lock.lease()).unwrap(), Some(Duration::from_secs(2)));

    clock.advance(Duration::from_secs(2));

    assert!(!lock.is_acquired());
    assert_eq!(sim.key_count(), 0);

    let next = Lock::acquire(&store, "/g/lock", TTL, Duration::ZERO).unwrap();
    assert!(next.is_acquired());

    // Dropping the expired guard must not touch the new holder
    drop(lock);
    assert!(next.is_acquired());
}
