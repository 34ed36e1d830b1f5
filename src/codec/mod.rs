//! Codec Module
//!
//! Turns an instance payload into the bytes stored at its key and back.
//!
//! ## Payload
//! The stored record is exactly the declared attributes plus `state` and
//! `messages`. With the default `JsonCodec` it is one flat JSON object:
//!
//! ```text
//! {"oid": "…", "x": 5, "state": "UPDATING", "messages": ["…"]}
//! ```

mod json;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use json::JsonCodec;

use crate::error::Result;
use crate::model::State;

/// Serializable form of an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,

    #[serde(default)]
    pub state: State,

    #[serde(default)]
    pub messages: Vec<String>,
}

/// Pluggable payload encoding
pub trait Codec: Send + Sync {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Payload>;
}
