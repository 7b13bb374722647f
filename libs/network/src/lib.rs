//! # Network - Broker Substrate For The Mesh
//!
//! Connection, channel and topology primitives every peer builds on:
//!
//! - [`BrokerChannel`]: exchanges, queues, bindings, publish, consume, ack
//! - [`InMemoryBroker`]: process-local broker with AMQP routing semantics
//! - `amqp` feature: RabbitMQ adapter over `lapin`
//! - [`PeerTopology`]: the namespaced topic layout of one peer
//!
//! Connection failures are returned to the caller as [`TransportError`];
//! nothing here retries.

pub mod broker;
pub mod error;
pub mod topology;

pub use broker::{
    connect, Acknowledge, BrokerChannel, ConnectOptions, Delivery, DeliveryStream, ExchangeKind, ExchangeOptions,
    InMemoryBroker, MessageProperties, QueueOptions,
};
pub use error::{Result, TransportError};
pub use topology::{scoped, PeerTopology};
