//! # Envelope - Wire Form Shared By Every Event
//!
//! Every message exchanged over the broker is a JSON object of the shape
//! `{"name": string, "id": string, "key"?: string, "data": object}`. The
//! `name` selects the event type, `id` identifies the emitting process (or the
//! correlation id for RPC traffic), `key` is the logical peer identity used for
//! echo suppression, and `data` is type specific.

use crate::error::{CodecError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw, untyped envelope as it travels on the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub name: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(name: impl Into<String>, id: impl Into<String>, key: Option<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            key,
            data,
        }
    }

    /// Parse an envelope from delivery bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize to the bytes published on the broker
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn to_json(&self) -> Value {
        // Envelope only holds JSON-native fields, serialization cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// True when this envelope was emitted by the peer identified by `key`
    pub fn is_from(&self, key: &str) -> bool {
        self.key.as_deref() == Some(key)
    }

    /// Ensure the envelope carries `expected` as its name
    pub fn expect_name(&self, expected: &'static str) -> Result<()> {
        if self.name != expected {
            return Err(CodecError::invalid_event(expected, &self.name));
        }
        Ok(())
    }

    /// Decode `data` into an event-specific payload
    pub(crate) fn payload<T: DeserializeOwned>(&self, event: &'static str) -> Result<T> {
        T::deserialize(&self.data).map_err(|e| CodecError::invalid_payload(event, e))
    }
}

/// Typed event that can be put on and taken off the wire
///
/// `reconstruct` must reject any envelope whose name is not [`Event::NAME`];
/// peers share one topic exchange, so cross-type delivery is expected and has
/// to be caught here.
pub trait Event: Sized {
    /// Wire name of the event
    const NAME: &'static str;

    /// Build the wire form `{name, id, key, data}`
    fn to_envelope(&self) -> Envelope;

    /// Validate the name and rebuild the typed event
    fn reconstruct(envelope: &Envelope) -> Result<Self>;

    /// Convenience for `reconstruct` straight from JSON
    fn from_json(value: Value) -> Result<Self> {
        let envelope: Envelope = serde_json::from_value(value)?;
        Self::reconstruct(&envelope)
    }

    /// Convenience for `to_envelope().to_json()`
    fn to_json(&self) -> Value {
        self.to_envelope().to_json()
    }
}

pub(crate) fn to_data<T: Serialize>(payload: &T) -> Value {
    // Payload structs are plain serde derives over JSON-native fields
    serde_json::to_value(payload).unwrap_or(Value::Null)
}
