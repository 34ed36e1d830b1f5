//! Model schema and keyspace
//!
//! A `Model` is validated once at construction, then only read. It maps
//! instances to `<prefix>/<object id>` keys in its bound store.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{AttrDefault, AttrSpec, Instance, Instances, State, WatchQueue};
use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::kv::{KeyValue, Store};
use crate::watch::{EventFilter, WatchEvent};

/// Attribute names owned by the state subsystem
pub const RESERVED_ATTRIBUTES: [&str; 2] = ["state", "messages"];

/// Message posted on every instance by `Model::learn`
pub const LEARNING_MESSAGE: &str = "Learning initiated";

struct ModelInner {
    prefix: String,

    /// `prefix` followed by `/`, the range every instance key falls in
    child_prefix: String,

    attrs: Vec<AttrSpec>,
    object_id: usize,
    store: Store,
    codec: Arc<dyn Codec>,
}

/// A declared schema bound to a store
///
/// Cheap to clone and safe to share across threads.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Start declaring a model rooted at `prefix` in `store`
    pub fn builder(prefix: impl Into<String>, store: Store) -> ModelBuilder {
        ModelBuilder {
            prefix: prefix.into(),
            store,
            attrs: Vec::new(),
            codec: Arc::new(JsonCodec),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Declared attributes, in declaration order
    pub fn attributes(&self) -> &[AttrSpec] {
        &self.inner.attrs
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrSpec> {
        self.inner.attrs.iter().find(|attr| attr.name() == name)
    }

    /// Name of the object-id attribute
    pub fn object_id_attribute(&self) -> &str {
        self.inner.attrs[self.inner.object_id].name()
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.inner.codec
    }

    /// Store key of the instance with object id `id`
    pub fn key_for(&self, id: &str) -> String {
        format!("{}{}", self.inner.child_prefix, id)
    }

    /// New in-memory instance with every attribute at its default
    pub fn new_instance(&self) -> Instance {
        self.new_with(std::iter::empty::<(String, Value)>())
    }

    /// New in-memory instance with some attributes given explicitly
    ///
    /// Names not declared in the schema are ignored. Defaults (and the
    /// object-id generator) run only for attributes left unset.
    pub fn new_with<I, K, V>(&self, overrides: I) -> Instance
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut given: BTreeMap<String, Value> = BTreeMap::new();
        for (name, value) in overrides {
            let name = name.into();
            if self.attribute(&name).is_some() {
                given.insert(name, value.into());
            } else {
                tracing::debug!("Ignoring undeclared attribute {:?} for {}", name, self.prefix());
            }
        }

        let attrs = self
            .inner
            .attrs
            .iter()
            .map(|spec| {
                let value = given
                    .remove(spec.name())
                    .unwrap_or_else(|| spec.default_for_new());
                (spec.name().to_string(), value)
            })
            .collect();

        Instance::from_parts(self.clone(), attrs, State::default(), Vec::new(), None)
    }

    /// Stored instance with object id `id`, or `None`
    pub fn get(&self, id: &str) -> Result<Option<Instance>> {
        // No instance can be stored under such an id; its key may be a lock
        if !is_valid_object_id(id) {
            return Ok(None);
        }
        match self.inner.store.get(&self.key_for(id))? {
            Some(kv) => self.decode(&kv).map(Some),
            None => Ok(None),
        }
    }

    /// Lazy sequence of every stored instance, ordered by key
    pub fn list(&self) -> Result<Instances> {
        let range = self.inner.store.range(&self.inner.child_prefix)?;
        Ok(Instances::new(self.clone(), range))
    }

    /// Every stored instance, collected
    pub fn get_all(&self) -> Result<Vec<Instance>> {
        self.list()?.collect()
    }

    /// Open a queue of stored instances that are `UPDATING` or `DELETING`
    ///
    /// Only puts made after this call are delivered.
    pub fn watch(&self) -> Result<WatchQueue> {
        let stream = self
            .inner
            .store
            .watch(&self.inner.child_prefix, self.pending_filter())?;
        Ok(WatchQueue::new(self.clone(), stream))
    }

    /// Push every stored instance through the watchers again
    ///
    /// Instances not `DELETING` become `UPDATING`; each gets the learning
    /// message and is put exactly once. Returns how many were learned.
    pub fn learn(&self) -> Result<usize> {
        let mut learned = 0;
        for instance in self.list()? {
            let mut instance = instance?;
            if instance.state() != State::Deleting {
                instance.set_state(State::Updating);
            }
            instance.post_message(LEARNING_MESSAGE)?;
            learned += 1;
        }
        tracing::debug!("Learned {} instance(s) of {}", learned, self.prefix());
        Ok(learned)
    }

    /// Object id encoded in `key`, if `key` is an instance key of this model
    pub(crate) fn object_id_in_key<'k>(&self, key: &'k str) -> Option<&'k str> {
        instance_id_in(&self.inner.child_prefix, key)
    }

    /// Rebuild an instance from a stored key
    ///
    /// Attributes missing from the payload take their defaults; payload
    /// entries not declared in the schema are dropped.
    pub(crate) fn decode(&self, kv: &KeyValue) -> Result<Instance> {
        let mut payload = self.inner.codec.decode(&kv.value)?;
        let stored_id = self.object_id_in_key(&kv.key);

        let attrs = self
            .inner
            .attrs
            .iter()
            .map(|spec| {
                let value = match payload.attributes.remove(spec.name()) {
                    Some(value) => value,
                    None => match (spec.is_object_id(), stored_id) {
                        (true, Some(id)) => Value::String(id.to_string()),
                        _ => spec.default_for_new(),
                    },
                };
                (spec.name().to_string(), value)
            })
            .collect();

        Ok(Instance::from_parts(
            self.clone(),
            attrs,
            payload.state,
            payload.messages,
            Some(kv.mod_revision),
        ))
    }

    /// Dispatch-time filter: puts of instance keys whose state is pending
    ///
    /// Payloads that fail to decode are let through so the consumer sees
    /// the decode error.
    fn pending_filter(&self) -> EventFilter {
        let child_prefix = self.inner.child_prefix.clone();
        let codec = Arc::clone(&self.inner.codec);

        Arc::new(move |event: &WatchEvent| {
            if !event.is_put() || instance_id_in(&child_prefix, event.key()).is_none() {
                return false;
            }
            match codec.decode(&event.kv.value) {
                Ok(payload) => payload.state.is_pending(),
                Err(_) => true,
            }
        })
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("prefix", &self.inner.prefix)
            .field("attrs", &self.inner.attrs)
            .field("object_id", &self.object_id_attribute())
            .finish()
    }
}

/// Object ids map to exactly one key segment below the model prefix
pub(crate) fn is_valid_object_id(id: &str) -> bool {
    !id.is_empty() && !id.contains('/')
}

/// Direct children of `child_prefix` only; lock sub-keys are excluded
fn instance_id_in<'k>(child_prefix: &str, key: &'k str) -> Option<&'k str> {
    key.strip_prefix(child_prefix)
        .filter(|id| is_valid_object_id(id))
}

/// Builder for Model
pub struct ModelBuilder {
    prefix: String,
    store: Store,
    attrs: Vec<AttrSpec>,
    codec: Arc<dyn Codec>,
}

impl ModelBuilder {
    /// Declare one attribute
    pub fn attr(mut self, spec: AttrSpec) -> Self {
        self.attrs.push(spec);
        self
    }

    /// Declare several attributes
    pub fn attrs(mut self, specs: impl IntoIterator<Item = AttrSpec>) -> Self {
        self.attrs.extend(specs);
        self
    }

    /// Replace the default JSON codec
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Validate the declaration and freeze it
    pub fn build(self) -> Result<Model> {
        if self.prefix.is_empty() {
            return Err(Error::Schema("model prefix must not be empty".to_string()));
        }
        if self.prefix.ends_with('/') {
            return Err(Error::Schema(format!(
                "model prefix {:?} must not end with '/'",
                self.prefix
            )));
        }

        let mut seen = HashSet::new();
        for attr in &self.attrs {
            if attr.name().is_empty() {
                return Err(Error::Schema("attribute names must not be empty".to_string()));
            }
            if RESERVED_ATTRIBUTES.contains(&attr.name()) {
                return Err(Error::Schema(format!(
                    "attribute name {:?} is reserved",
                    attr.name()
                )));
            }
            if !seen.insert(attr.name()) {
                return Err(Error::Schema(format!(
                    "duplicate attribute {:?} in {}",
                    attr.name(),
                    self.prefix
                )));
            }
        }

        let ids: Vec<usize> = self
            .attrs
            .iter()
            .enumerate()
            .filter(|(_, attr)| attr.is_object_id())
            .map(|(index, _)| index)
            .collect();

        let object_id = match ids.as_slice() {
            [index] => *index,
            [] => {
                return Err(Error::Schema(format!("{} must have an object id", self.prefix)));
            }
            _ => {
                return Err(Error::Schema(format!(
                    "{} can't have {} object ids",
                    self.prefix,
                    ids.len()
                )));
            }
        };

        if let Some(AttrDefault::Value(_)) = self.attrs[object_id].default() {
            return Err(Error::Schema(format!(
                "object id {:?} default must be a generator",
                self.attrs[object_id].name()
            )));
        }

        let child_prefix = format!("{}/", self.prefix);
        tracing::debug!(
            "Model {} declared with {} attribute(s)",
            self.prefix,
            self.attrs.len()
        );

        Ok(Model {
            inner: Arc::new(ModelInner {
                prefix: self.prefix,
                child_prefix,
                attrs: self.attrs,
                object_id,
                store: self.store,
                codec: self.codec,
            }),
        })
    }
}
