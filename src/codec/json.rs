//! JSON payload codec

use super::{Codec, Payload};
use crate::error::Result;

/// Stores payloads as compact UTF-8 JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(payload)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Payload> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
