//! Model watch queues and instance iteration

use std::time::Duration;

use super::{Instance, Model};
use crate::error::Result;
use crate::kv::KvRange;
use crate::watch::WatchStream;

/// Per-model queue of instances that are `UPDATING` or `DELETING`
///
/// Puts of `READY` instances, deletes and lock keys never reach the
/// queue. Dropping it ends the subscription.
pub struct WatchQueue {
    model: Model,
    stream: WatchStream,
}

impl WatchQueue {
    pub(crate) fn new(model: Model, stream: WatchStream) -> Self {
        Self { model, stream }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Block until the next instance arrives
    pub fn get(&self) -> Result<Instance> {
        let event = self.stream.recv()?;
        self.model.decode(&event.kv)
    }

    /// Next instance if one is already queued
    pub fn try_get(&self) -> Result<Option<Instance>> {
        match self.stream.try_recv()? {
            Some(event) => self.model.decode(&event.kv).map(Some),
            None => Ok(None),
        }
    }

    /// Wait at most `timeout` for the next instance
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<Instance>> {
        match self.stream.recv_timeout(timeout)? {
            Some(event) => self.model.decode(&event.kv).map(Some),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.stream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }
}

/// Lazy iteration over a model's stored instances
pub struct Instances {
    model: Model,
    range: KvRange,
}

impl Instances {
    pub(crate) fn new(model: Model, range: KvRange) -> Self {
        Self { model, range }
    }
}

impl Iterator for Instances {
    type Item = Result<Instance>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let kv = self.range.next()?;
            // Skip lock sub-keys
            if self.model.object_id_in_key(&kv.key).is_some() {
                return Some(self.model.decode(&kv));
            }
        }
    }
}
