//! # Peer Topology
//!
//! Namespaced topic layout shared by every peer of a deployment:
//!
//! | Item | Value |
//! |------|-------|
//! | exchange | `<namespace>.<exchange>` (topic, non-durable) |
//! | private queue | `<namespace>.<service>.<id>` (exclusive) |
//! | queue bindings | `<namespace>`, `<namespace>.<service>`, `<namespace>.<service>.<id>` |
//! | presence routing key | `<namespace>` |
//! | RPC routing key | `<namespace>.<target service>` |
//!
//! Without a namespace the `<namespace>.` prefix is dropped and presence
//! travels on the empty routing key.

use crate::broker::{BrokerChannel, ExchangeKind, ExchangeOptions, QueueOptions};
use crate::Result;
use tracing::debug;

/// Join the non-empty segments of a namespaced name with dots
pub fn scoped(namespace: &str, rest: &[&str]) -> String {
    std::iter::once(namespace)
        .chain(rest.iter().copied())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Exchange, queue and bindings of one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTopology {
    namespace: String,
    service: String,
    id: String,
    exchange: String,
    queue: String,
}

impl PeerTopology {
    pub fn new(namespace: Option<&str>, exchange: &str, service: &str, id: &str) -> Self {
        let namespace = namespace.unwrap_or_default().to_string();
        Self {
            exchange: scoped(&namespace, &[exchange]),
            queue: scoped(&namespace, &[service, id]),
            namespace,
            service: service.to_string(),
            id: id.to_string(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Private queue of this peer, also its RPC `reply_to`
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Broadcast scope for Hello, Welcome, ServicesPublished and service events
    pub fn presence_key(&self) -> String {
        self.namespace.clone()
    }

    /// Routing key reaching every peer hosting `service`
    pub fn rpc_key(&self, service: &str) -> String {
        scoped(&self.namespace, &[service])
    }

    /// Binding keys of the private queue
    pub fn filters(&self) -> Vec<String> {
        vec![
            self.presence_key(),
            scoped(&self.namespace, &[&self.service]),
            scoped(&self.namespace, &[&self.service, &self.id]),
        ]
    }

    /// Declare the exchange and the exclusive private queue with its bindings
    pub async fn declare(&self, channel: &dyn BrokerChannel) -> Result<()> {
        channel
            .declare_exchange(&self.exchange, ExchangeKind::Topic, ExchangeOptions { durable: false })
            .await?;
        channel.declare_queue(&self.queue, QueueOptions::exclusive()).await?;
        for filter in self.filters() {
            channel.bind_queue(&self.queue, &self.exchange, &filter).await?;
        }
        debug!(exchange = %self.exchange, queue = %self.queue, filters = ?self.filters(), "Declared peer topology");
        Ok(())
    }
}
