//! Watch dispatcher
//!
//! Fans committed mutations out to prefix subscriptions over unbounded
//! crossbeam channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use super::{EventFilter, WatchEvent};
use crate::error::{Error, Result};

/// Identifier of one subscription
pub type WatchId = u64;

struct Subscription {
    id: WatchId,
    prefix: String,
    filter: EventFilter,
    tx: Sender<WatchEvent>,
}

/// Registry of prefix subscriptions
///
/// `dispatch` must be called from inside the store's critical section so
/// that every subscriber receives events in revision order. Channels are
/// unbounded: producers never block on a slow consumer.
pub struct WatchDispatcher {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl WatchDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a subscription for keys starting with `prefix`
    pub fn subscribe(self: &Arc<Self>, prefix: &str, filter: EventFilter) -> WatchStream {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::unbounded();

        self.subscriptions.lock().push(Subscription {
            id,
            prefix: prefix.to_string(),
            filter,
            tx,
        });
        tracing::debug!("Watch {} subscribed to prefix {:?}", id, prefix);

        WatchStream {
            id,
            rx,
            dispatcher: Arc::downgrade(self),
        }
    }

    /// Remove a subscription; events after this call are not delivered
    pub fn unsubscribe(&self, id: WatchId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        let removed = subscriptions.len() != before;
        if removed {
            tracing::debug!("Watch {} unsubscribed", id);
        }
        removed
    }

    /// Deliver `event` to every matching subscription
    ///
    /// Returns the number of queues the event was pushed onto.
    pub fn dispatch(&self, event: &WatchEvent) -> usize {
        let mut delivered = 0;
        let mut subscriptions = self.subscriptions.lock();

        subscriptions.retain(|sub| {
            if !event.key().starts_with(&sub.prefix) || !(sub.filter)(event) {
                return true;
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                // Receiver gone without unsubscribing
                Err(_) => false,
            }
        });

        tracing::trace!(
            "Dispatched {:?} {} at revision {} to {} watcher(s)",
            event.kind,
            event.key(),
            event.revision(),
            delivered
        );
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

/// Receiving end of one subscription
///
/// Dropping the stream unsubscribes it.
pub struct WatchStream {
    id: WatchId,
    rx: Receiver<WatchEvent>,
    dispatcher: Weak<WatchDispatcher>,
}

impl WatchStream {
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Block until the next event arrives
    pub fn recv(&self) -> Result<WatchEvent> {
        self.rx.recv().map_err(|_| Error::WatchClosed)
    }

    /// Next event if one is already queued
    pub fn try_recv(&self) -> Result<Option<WatchEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::WatchClosed),
        }
    }

    /// Wait at most `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<WatchEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::WatchClosed),
        }
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.unsubscribe(self.id);
        }
    }
}
