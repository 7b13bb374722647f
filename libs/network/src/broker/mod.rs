//! # Broker Channel Abstraction
//!
//! The subset of AMQP 0-9-1 the mesh relies on: exchanges (topic, fanout,
//! direct), queues (durable/exclusive/auto-delete), bindings, publishing with
//! `correlation_id`/`reply_to` properties, the default exchange for direct
//! replies, and consumers that acknowledge deliveries.
//!
//! ```mermaid
//! graph LR
//!     P[publish exchange, key] --> X{exchange}
//!     X -->|binding matches| Q1[queue A]
//!     X -->|binding matches| Q2[queue B]
//!     D[send_to_queue] -->|default exchange| Q1
//!     Q1 --> C[consume stream]
//! ```
//!
//! Two implementations exist: [`memory::InMemoryBroker`] for `memory://`
//! urls, and the lapin backed adapter for `amqp://`/`amqps://` urls when the
//! `amqp` feature is enabled.

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;
pub mod routing;

use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub use memory::InMemoryBroker;
pub use routing::topic_matches;

/// Exchange routing behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Topic,
    Fanout,
    Direct,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Topic => f.write_str("topic"),
            ExchangeKind::Fanout => f.write_str("fanout"),
            ExchangeKind::Direct => f.write_str("direct"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeOptions {
    pub durable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    /// Owned by the declaring connection and deleted when it closes
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Non-durable queue private to the declaring connection
    pub fn exclusive() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: false,
        }
    }
}

/// Message properties the mesh reads or writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub content_type: Option<String>,
}

impl MessageProperties {
    pub fn json() -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            ..Default::default()
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// Acknowledges a single delivery back to the broker
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> Result<()>;
}

/// A message taken off a queue
pub struct Delivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Bytes,
    pub properties: MessageProperties,
    acker: Option<Box<dyn Acknowledge>>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: Bytes,
        properties: MessageProperties,
    ) -> Self {
        Self {
            delivery_tag,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload,
            properties,
            acker: None,
        }
    }

    pub fn with_acker(mut self, acker: Box<dyn Acknowledge>) -> Self {
        self.acker = Some(acker);
        self
    }

    /// Acknowledge the delivery; a no-op for brokers that settle on dispatch
    pub async fn ack(&self) -> Result<()> {
        match &self.acker {
            Some(acker) => acker.ack().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("payload_len", &self.payload.len())
            .field("properties", &self.properties)
            .finish()
    }
}

/// Stream of deliveries for one consumer
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Channel to a message broker
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, options: ExchangeOptions) -> Result<()>;

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()>;

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Publish to `exchange`; returns once the local channel write completed
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
        properties: MessageProperties,
    ) -> Result<()>;

    /// Deliver straight to `queue` through the default exchange
    async fn send_to_queue(&self, queue: &str, payload: Bytes, properties: MessageProperties) -> Result<()> {
        self.publish("", queue, payload, properties).await
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    async fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// Options applied when opening a broker connection
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Shown by the broker management UI, `<host>-<id>` for mesh peers
    pub connection_name: Option<String>,
}

/// Open a channel for `url`
///
/// `memory://<name>` joins the process-wide in-memory broker `<name>`;
/// `amqp://` and `amqps://` need the `amqp` feature.
pub async fn connect(url: &str, options: ConnectOptions) -> Result<Arc<dyn BrokerChannel>> {
    let scheme = url
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| TransportError::configuration(format!("Invalid broker url '{}'", url), Some("url")))?;

    match scheme {
        "memory" => {
            let name = url.trim_start_matches("memory://");
            let broker = InMemoryBroker::named(name);
            let channel = broker.connect();
            info!(url, connection_name = ?options.connection_name, "Connected to in-memory broker");
            Ok(Arc::new(channel))
        }
        #[cfg(feature = "amqp")]
        "amqp" | "amqps" => {
            let channel = amqp::AmqpChannel::connect(url, &options).await?;
            info!(connection_name = ?options.connection_name, "Connected to AMQP broker");
            Ok(Arc::new(channel))
        }
        #[cfg(not(feature = "amqp"))]
        "amqp" | "amqps" => Err(TransportError::configuration(
            "AMQP support is not compiled in, enable the `amqp` feature",
            Some("url"),
        )),
        other => Err(TransportError::configuration(
            format!("Unsupported broker scheme '{}'", other),
            Some("url"),
        )),
    }
}
