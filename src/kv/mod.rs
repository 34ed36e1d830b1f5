//! Key-Value Module
//!
//! The coordination-store contract and its in-memory simulation.
//!
//! ## Responsibilities
//! - Revision-ordered get/put/delete/range over string keys
//! - TTL leases owning keys, and lease-guarded locks
//! - Prefix watches fed synchronously from every committed mutation
//!
//! ## Concurrency Model
//! Every simulator operation runs inside one store-wide critical section:
//! table mutation, revision bump, lease bookkeeping and watch enqueue all
//! happen before the call returns, so no two mutations interleave and
//! every watcher sees events in revision order.

mod clock;
mod simulator;
mod table;

use std::sync::Arc;
use std::time::Duration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use simulator::{RangeIter, Simulator, SimulatorBuilder};
pub use table::KvTable;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lease::LeaseId;
use crate::watch::{EventFilter, WatchStream};

/// A stored key with its etcd-style metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,

    /// Revision at which the key was (last) created
    pub create_revision: u64,

    /// Revision of the last modification
    pub mod_revision: u64,

    /// Number of puts since creation
    pub version: u64,

    /// Lease owning the key, if any
    pub lease: Option<LeaseId>,
}

/// Lazy, finite, key-ordered sequence returned by `range`
pub type KvRange = Box<dyn Iterator<Item = KeyValue> + Send>;

/// Shared handle to a coordination store
pub type Store = Arc<dyn KvStore>;

/// Operations the model layer needs from a coordination store
///
/// Implemented by `Simulator`; a network-backed client would implement
/// the same contract.
pub trait KvStore: Send + Sync {
    /// Look up a key; `None` when absent
    fn get(&self, key: &str) -> Result<Option<KeyValue>>;

    /// Write a key, returning the new revision
    fn put(&self, key: &str, value: Vec<u8>) -> Result<u64>;

    /// Write a key owned by `lease`; the key is deleted when the lease ends
    fn put_with_lease(&self, key: &str, value: Vec<u8>, lease: LeaseId) -> Result<u64>;

    /// Delete a key; `false` when it was absent
    fn delete(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, in key order
    fn range(&self, prefix: &str) -> Result<KvRange>;

    /// Register a lease expiring `ttl` from now
    fn grant_lease(&self, ttl: Duration) -> Result<LeaseId>;

    /// End a lease early, deleting its keys; `false` when already gone
    fn revoke_lease(&self, lease: LeaseId) -> Result<bool>;

    /// Time left before `lease` expires; `None` when already gone
    fn lease_time_to_live(&self, lease: LeaseId) -> Result<Option<Duration>>;

    /// Create `key` owned by `lease` if absent, retrying until `timeout`
    ///
    /// A zero timeout makes exactly one attempt.
    fn lock(&self, key: &str, lease: LeaseId, timeout: Duration) -> Result<bool>;

    /// Delete `key` if `lease` still owns it; `false` otherwise
    fn unlock(&self, key: &str, lease: LeaseId) -> Result<bool>;

    /// Subscribe to mutations of keys under `prefix` accepted by `filter`
    fn watch(&self, prefix: &str, filter: EventFilter) -> Result<WatchStream>;

    /// Revision of the last committed mutation
    fn current_revision(&self) -> Result<u64>;
}

/// Open the store selected by `config`
///
/// `mock = true` starts a fresh `Simulator`. The network-backed client is
/// not part of this crate, so `mock = false` is `BackendUnavailable`.
pub fn connect(config: &Config) -> Result<Store> {
    if config.mock {
        tracing::info!("Using in-memory store simulator");
        return Ok(Simulator::with_config(config).into_store());
    }
    Err(Error::BackendUnavailable(config.endpoint()))
}
