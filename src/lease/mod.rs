//! Lease Module
//!
//! TTL-bound ownership tokens for store keys.
//!
//! ## Responsibilities
//! - Grant leases with a deadline read from the store clock
//! - Track the keys each lease owns
//! - Hand expired leases back to the store so their keys are deleted
//!
//! ## Lock Protocol
//! A lock is a key created only if absent and owned by a lease. The lock
//! is held while that key exists; it disappears on `unlock`, on lease
//! revocation, or when the lease deadline passes. Leases are never
//! renewed.

mod reaper;
mod table;

pub use reaper::Reaper;
pub use table::{LeaseRecord, LeaseTable};

/// Identifier of a granted lease
pub type LeaseId = i64;
