//! Watch Module
//!
//! Prefix subscriptions over committed store mutations.
//!
//! ## Delivery Guarantees
//! - Events are enqueued before the mutating call returns
//! - Each queue sees events in non-decreasing revision order
//! - Nothing is buffered for a prefix nobody is subscribed to
//! - After a stream is dropped its events are discarded

mod dispatcher;
mod event;

pub use dispatcher::{WatchDispatcher, WatchId, WatchStream};
pub use event::{accept_all, EventFilter, EventKind, WatchEvent};
