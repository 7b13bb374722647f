//! Typed events carried inside [`crate::Envelope`]s.

pub mod presence;
pub mod rpc;
pub mod service;
pub mod services;

pub use presence::{HelloEvent, Presence, TransportKind, WelcomeEvent};
pub use rpc::{RemoteFailure, RpcCall, RpcRequestEvent, RpcResponseEvent};
pub use service::ServiceEvent;
pub use services::{ServiceDescriptor, ServicesPublishedEvent};

use crate::error::CodecError;
use crate::Envelope;

/// Presence events identify their peer by `key`, preferring the envelope
/// field and falling back to the copy inside `data`
pub(crate) fn peer_key(envelope: &Envelope, data_key: Option<String>, event: &'static str) -> Result<String, CodecError> {
    envelope
        .key
        .clone()
        .or(data_key)
        .ok_or_else(|| CodecError::invalid_payload(event, <serde_json::Error as serde::de::Error>::missing_field("key")))
}
