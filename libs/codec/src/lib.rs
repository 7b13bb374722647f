//! # Mesh Codec - Presence And RPC Wire Format
//!
//! Typed events exchanged between peers over the broker, all sharing the
//! envelope `{name, id, key?, data}`:
//!
//! | Event | Purpose |
//! |-------|---------|
//! | [`HelloEvent`] | A peer started |
//! | [`WelcomeEvent`] | A running publisher answers a Hello |
//! | [`ServicesPublishedEvent`] | Full listing of a peer's services |
//! | [`RpcRequestEvent`] / [`RpcResponseEvent`] | Correlated service call |
//! | [`ServiceEvent`] | State change of a published service |
//!
//! Every type implements [`Event`]: `to_envelope` builds the wire form and
//! `reconstruct` rebuilds it, refusing envelopes carrying another name.
//! Consumers decode deliveries with [`InboundEvent::decode`].
//!
//! ```rust
//! use codec::{Event, HelloEvent, Presence, TransportKind};
//!
//! let hello = HelloEvent::create("id-1", "peer-a", Presence::new("peer-a", TransportKind::Rpc));
//! let wire = hello.to_envelope().to_vec().unwrap();
//! let back = codec::InboundEvent::from_slice(&wire).unwrap();
//! assert_eq!(back.name(), "HelloEvent");
//! ```

pub mod constants;
pub mod envelope;
pub mod error;
pub mod events;
pub mod inbound;

pub use constants::*;
pub use envelope::{Envelope, Event};
pub use error::{CodecError, Result};
pub use events::{
    HelloEvent, Presence, RemoteFailure, RpcCall, RpcRequestEvent, RpcResponseEvent, ServiceDescriptor,
    ServiceEvent, ServicesPublishedEvent, TransportKind, WelcomeEvent,
};
pub use inbound::InboundEvent;
