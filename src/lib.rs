//! # etcd3-model
//!
//! Typed object models stored in an etcd-style coordination store:
//! - Declarative schemas with exactly one object-id attribute
//! - `READY` / `UPDATING` / `DELETING` lifecycle with a message log
//! - Per-model watch queues of instances that need reconciling
//! - Per-instance locks bound to TTL leases
//! - An in-memory store simulator with etcd revision, lease and watch
//!   semantics
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Model / Instance / Lock / WatchQueue         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Codec (payload <-> bytes)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     KvStore (trait)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┬─────────────────┐
//!          ▼                         ▼                 ▼
//!   ┌─────────────┐          ┌─────────────┐   ┌─────────────┐
//!   │   KvTable   │          │ LeaseTable  │   │   Watch     │
//!   │ (revisions) │          │  + Reaper   │   │ Dispatcher  │
//!   └─────────────┘          └─────────────┘   └─────────────┘
//!          └──────── one critical section (Simulator) ────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod kv;
pub mod lease;
pub mod watch;
pub mod codec;
pub mod model;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Error, Result};
pub use config::Config;
pub use kv::{connect, KvStore, Simulator, Store};
pub use model::{AttrSpec, Instance, Lock, Model, State, WatchQueue};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of etcd3-model
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
