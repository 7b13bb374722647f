//! Outbound side of the presence protocol
//!
//! Presence envelopes are broadcast on the shared exchange with the
//! namespace as routing key. RPC requests go to the target service's topic
//! carrying `correlation_id` and `reply_to`; RPC responses bypass the
//! exchange and land directly on the caller's private queue.

use crate::error::MeshError;
use bytes::Bytes;
use codec::{Event, HelloEvent, RpcRequestEvent, RpcResponseEvent, ServiceEvent, ServicesPublishedEvent, WelcomeEvent};
use network::{BrokerChannel, MessageProperties, PeerTopology};
use std::sync::Arc;
use tracing::debug;

/// Where an RPC request is sent and where its answer must go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRouting {
    pub topic: String,
    pub correlation_id: String,
    pub reply_to: String,
}

/// Where an RPC response is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRouting {
    pub reply_to: String,
    pub correlation_id: String,
}

pub struct Publisher {
    channel: Arc<dyn BrokerChannel>,
    exchange: String,
    presence_key: String,
}

impl Publisher {
    pub fn new(channel: Arc<dyn BrokerChannel>, exchange: impl Into<String>, presence_key: impl Into<String>) -> Self {
        Self {
            channel,
            exchange: exchange.into(),
            presence_key: presence_key.into(),
        }
    }

    pub fn for_topology(channel: Arc<dyn BrokerChannel>, topology: &PeerTopology) -> Self {
        Self::new(channel, topology.exchange(), topology.presence_key())
    }

    fn encode<E: Event>(event: &E) -> Result<Bytes, MeshError> {
        Ok(Bytes::from(event.to_envelope().to_vec()?))
    }

    async fn broadcast<E: Event>(&self, event: &E) -> Result<(), MeshError> {
        let payload = Self::encode(event)?;
        self.channel
            .publish(&self.exchange, &self.presence_key, payload, MessageProperties::json())
            .await?;
        debug!(event = E::NAME, exchange = %self.exchange, routing_key = %self.presence_key, "Broadcast presence event");
        Ok(())
    }

    pub async fn emit_greet(&self, event: &HelloEvent) -> Result<(), MeshError> {
        self.broadcast(event).await
    }

    pub async fn emit_welcome(&self, event: &WelcomeEvent) -> Result<(), MeshError> {
        self.broadcast(event).await
    }

    pub async fn emit_services(&self, event: &ServicesPublishedEvent) -> Result<(), MeshError> {
        self.broadcast(event).await
    }

    pub async fn emit_service_event(&self, event: &ServiceEvent) -> Result<(), MeshError> {
        self.broadcast(event).await
    }

    pub async fn request_rpc(&self, event: &RpcRequestEvent, routing: &RpcRouting) -> Result<(), MeshError> {
        let payload = Self::encode(event)?;
        let properties = MessageProperties::json()
            .with_correlation_id(routing.correlation_id.as_str())
            .with_reply_to(routing.reply_to.as_str());
        self.channel
            .publish(&self.exchange, &routing.topic, payload, properties)
            .await?;
        debug!(correlation_id = %routing.correlation_id, topic = %routing.topic, "Sent RPC request");
        Ok(())
    }

    pub async fn respond_rpc(&self, event: &RpcResponseEvent, routing: &ReplyRouting) -> Result<(), MeshError> {
        let payload = Self::encode(event)?;
        let properties = MessageProperties::json().with_correlation_id(routing.correlation_id.as_str());
        self.channel
            .send_to_queue(&routing.reply_to, payload, properties)
            .await?;
        debug!(correlation_id = %routing.correlation_id, reply_to = %routing.reply_to, "Sent RPC response");
        Ok(())
    }
}
