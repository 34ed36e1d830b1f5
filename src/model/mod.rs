//! Model Module
//!
//! Typed objects persisted in the coordination store.
//!
//! ## Responsibilities
//! - Declare a schema: attributes, defaults, exactly one object id
//! - Map instances to `<prefix>/<object id>` keys and back
//! - Carry the `READY | UPDATING | DELETING` state and message log
//! - Hand out per-instance locks and per-model watch queues
//!
//! ## Reconcile Protocol
//! ```text
//!  producer                      store                    consumer(s)
//!  ────────                      ─────                    ───────────
//!  state = UPDATING, put() ──▶  <prefix>/<id>  ──watch──▶ queue.get()
//!                                                         lock(ttl, 0)
//!                                                         ├─ busy: skip
//!                                                         └─ held: one step,
//!                                                            put UPDATING again,
//!                                                            set_ready(), or
//!                                                            remove() if DELETING
//! ```

mod attr;
mod instance;
mod lock;
mod queue;
mod schema;
mod state;

pub use attr::{uuid_v4, AttrDefault, AttrSpec, Generator};
pub use instance::Instance;
pub use lock::Lock;
pub use queue::{Instances, WatchQueue};
pub use schema::{Model, ModelBuilder, LEARNING_MESSAGE, RESERVED_ATTRIBUTES};
pub use state::{State, MESSAGES_DESCRIPTION};
