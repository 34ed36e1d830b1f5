//! Model instances
//!
//! An `Instance` is an in-memory copy of one object. Copies never alias:
//! every `get`, watch delivery or `clone` yields an independent value,
//! and only `put` changes what is stored.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;

use super::schema::is_valid_object_id;
use super::{Lock, Model, State};
use crate::codec::Payload;
use crate::error::{Error, Result};

/// One object of a model
#[derive(Clone)]
pub struct Instance {
    model: Model,
    attrs: BTreeMap<String, Value>,
    state: State,
    messages: Vec<String>,

    /// Store revision of the last put or read of this copy
    revision: Option<u64>,
}

impl Instance {
    pub(crate) fn from_parts(
        model: Model,
        attrs: BTreeMap<String, Value>,
        state: State,
        messages: Vec<String>,
        revision: Option<u64>,
    ) -> Self {
        Self {
            model,
            attrs,
            state,
            messages,
            revision,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Object id rendered as it appears in the store key
    pub fn id(&self) -> String {
        match self.attrs.get(self.model.object_id_attribute()) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// Store key of this instance
    pub fn key(&self) -> String {
        self.model.key_for(&self.id())
    }

    /// Store key of this instance's lock
    pub fn lock_key(&self) -> String {
        format!("{}/lock", self.key())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Assign a declared attribute
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        match self.attrs.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(Error::UnknownAttribute(name.to_string())),
        }
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Assign the state; always clears `messages`, even when unchanged
    pub fn set_state(&mut self, state: State) {
        self.messages.clear();
        self.state = state;
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Store revision this copy was last written or read at
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// Write this copy to the store, overwriting the stored one
    pub fn put(&mut self) -> Result<()> {
        let id = self.valid_id()?;

        let bytes = self.model.codec().encode(&self.to_payload())?;
        let revision = self.model.store().put(&self.model.key_for(&id), bytes)?;
        self.revision = Some(revision);
        Ok(())
    }

    /// Delete the stored copy; `false` when nothing was stored
    pub fn remove(&self) -> Result<bool> {
        self.model.store().delete(&self.key())
    }

    /// Append a message and put
    pub fn post_message(&mut self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        if message.is_empty() {
            return Err(Error::InvalidMessage);
        }
        self.messages.push(message);
        self.put()
    }

    /// Append a message unless one already contains it, then put either way
    pub fn post_message_once(&mut self, message: &str) -> Result<()> {
        if message.is_empty() {
            return Err(Error::InvalidMessage);
        }
        if !self.messages.iter().any(|posted| posted.contains(message)) {
            self.messages.push(message.to_string());
        }
        self.put()
    }

    /// Resolve to `READY` and put
    pub fn set_ready(&mut self) -> Result<()> {
        self.set_state(State::Ready);
        self.put()
    }

    /// Request deletion: `DELETING` with an optional reason, then put
    pub fn delete(&mut self, message: Option<&str>) -> Result<()> {
        self.set_state(State::Deleting);
        if let Some(message) = message.filter(|m| !m.is_empty()) {
            self.messages.push(message.to_string());
        }
        self.put()
    }

    /// Try to take this instance's store-wide lock
    ///
    /// The lock lives under a lease of `ttl` and is released when the
    /// returned guard drops. Check `Lock::is_acquired` before relying on
    /// it: with a zero `timeout` a busy lock is not waited for. Ids that
    /// `put` would reject are `InvalidObjectId` here too.
    pub fn lock(&self, ttl: Duration, timeout: Duration) -> Result<Lock> {
        self.valid_id()?;
        Lock::acquire(self.model.store(), self.lock_key(), ttl, timeout)
    }

    /// Object id, or `InvalidObjectId` when it cannot name a store key
    fn valid_id(&self) -> Result<String> {
        let id = self.id();
        if !is_valid_object_id(&id) {
            return Err(Error::InvalidObjectId(id));
        }
        Ok(id)
    }

    pub(crate) fn to_payload(&self) -> Payload {
        Payload {
            attributes: self.attrs.clone(),
            state: self.state,
            messages: self.messages.clone(),
        }
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.model.prefix() == other.model.prefix()
            && self.attrs == other.attrs
            && self.state == other.state
            && self.messages == other.messages
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("prefix", &self.model.prefix())
            .field("attrs", &self.attrs)
            .field("state", &self.state)
            .field("messages", &self.messages)
            .finish()
    }
}
