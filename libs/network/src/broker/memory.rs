//! # In-Memory Broker
//!
//! Process-local broker with AMQP routing semantics. Peers in the same process
//! reach each other by connecting to the same name (`memory://<name>`), which
//! resolves through a process-wide table.
//!
//! Deliveries are settled on dispatch, so [`Delivery::ack`] is a no-op here.
//! Exclusive and auto-delete queues are deleted together with their bindings
//! when the owning connection closes, which ends the consumer stream.

use super::routing::topic_matches;
use super::{
    BrokerChannel, Delivery, DeliveryStream, ExchangeKind, ExchangeOptions, MessageProperties, QueueOptions,
};
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

static BROKERS: Lazy<DashMap<String, Arc<InMemoryBroker>>> = Lazy::new(DashMap::new);

struct Binding {
    queue: String,
    routing_key: String,
}

struct ExchangeState {
    kind: ExchangeKind,
    bindings: Vec<Binding>,
}

struct QueueState {
    options: QueueOptions,
    owner: u64,
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeState>,
    queues: HashMap<String, QueueState>,
}

impl BrokerState {
    /// Queues an `(exchange, routing_key)` publish reaches, without duplicates
    fn route(&self, exchange: &str, routing_key: &str) -> Result<Vec<String>> {
        if exchange.is_empty() {
            return Ok(self
                .queues
                .contains_key(routing_key)
                .then(|| vec![routing_key.to_string()])
                .unwrap_or_default());
        }

        let state = self
            .exchanges
            .get(exchange)
            .ok_or_else(|| TransportError::not_found("exchange", exchange))?;

        let mut targets: Vec<String> = Vec::new();
        for binding in &state.bindings {
            let matched = match state.kind {
                ExchangeKind::Fanout => true,
                ExchangeKind::Direct => binding.routing_key == routing_key,
                ExchangeKind::Topic => topic_matches(&binding.routing_key, routing_key),
            };
            if matched && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }
        Ok(targets)
    }
}

/// A named, process-local broker
pub struct InMemoryBroker {
    name: String,
    state: Mutex<BrokerState>,
    next_connection: AtomicU64,
    next_delivery_tag: AtomicU64,
}

impl InMemoryBroker {
    /// Standalone broker, not reachable through `memory://` urls
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(BrokerState::default()),
            next_connection: AtomicU64::new(1),
            next_delivery_tag: AtomicU64::new(1),
        })
    }

    /// Get or create the process-wide broker called `name`
    pub fn named(name: &str) -> Arc<Self> {
        BROKERS
            .entry(name.to_string())
            .or_insert_with(|| Self::new(name))
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a new connection with its own channel
    pub fn connect(self: &Arc<Self>) -> MemoryChannel {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        debug!(broker = %self.name, connection_id, "Opened in-memory connection");
        MemoryChannel {
            broker: Arc::clone(self),
            connection_id,
            open: AtomicBool::new(true),
        }
    }

    pub fn has_exchange(&self, name: &str) -> bool {
        self.state.lock().exchanges.contains_key(name)
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.state.lock().queues.contains_key(name)
    }

    /// Routing keys `queue` is bound with on `exchange`
    pub fn bindings(&self, exchange: &str, queue: &str) -> Vec<String> {
        self.state
            .lock()
            .exchanges
            .get(exchange)
            .map(|x| {
                x.bindings
                    .iter()
                    .filter(|b| b.queue == queue)
                    .map(|b| b.routing_key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn release(&self, connection_id: u64) {
        let mut state = self.state.lock();
        let released: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, q)| q.owner == connection_id && (q.options.exclusive || q.options.auto_delete))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &released {
            state.queues.remove(name);
        }
        for exchange in state.exchanges.values_mut() {
            exchange.bindings.retain(|b| !released.contains(&b.queue));
        }
        if !released.is_empty() {
            debug!(broker = %self.name, connection_id, queues = ?released, "Deleted queues of closed connection");
        }
    }
}

/// Channel on an [`InMemoryBroker`] connection
pub struct MemoryChannel {
    broker: Arc<InMemoryBroker>,
    connection_id: u64,
    open: AtomicBool,
}

impl MemoryChannel {
    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::closed("in-memory channel is closed"))
        }
    }

    fn locked_by_other(&self, queue: &QueueState) -> bool {
        queue.options.exclusive && queue.owner != self.connection_id
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, _options: ExchangeOptions) -> Result<()> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(TransportError::channel("declare_exchange", "the default exchange cannot be declared"));
        }

        let mut state = self.broker.state.lock();
        match state.exchanges.get(name) {
            Some(existing) if existing.kind != kind => Err(TransportError::channel(
                "declare_exchange",
                format!("exchange '{}' exists as {}, not {}", name, existing.kind, kind),
            )),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    ExchangeState {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock();
        if let Some(existing) = state.queues.get(name) {
            if self.locked_by_other(existing) {
                return Err(TransportError::resource_locked(
                    name,
                    "exclusive queue is owned by another connection",
                ));
            }
            return Ok(());
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        state.queues.insert(
            name.to_string(),
            QueueState {
                options,
                owner: self.connection_id,
                sender,
                receiver: Some(receiver),
            },
        );
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock();
        match state.queues.get(queue) {
            None => return Err(TransportError::not_found("queue", queue)),
            Some(q) if self.locked_by_other(q) => {
                return Err(TransportError::resource_locked(
                    queue,
                    "exclusive queue is owned by another connection",
                ))
            }
            Some(_) => {}
        }

        let target = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| TransportError::not_found("exchange", exchange))?;
        let exists = target
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.routing_key == routing_key);
        if !exists {
            target.bindings.push(Binding {
                queue: queue.to_string(),
                routing_key: routing_key.to_string(),
            });
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
        properties: MessageProperties,
    ) -> Result<()> {
        self.ensure_open()?;
        let state = self.broker.state.lock();
        let targets = state.route(exchange, routing_key)?;

        if targets.is_empty() {
            trace!(exchange, routing_key, "Dropped unroutable message");
            return Ok(());
        }

        for queue in targets {
            if let Some(q) = state.queues.get(&queue) {
                let tag = self.broker.next_delivery_tag.fetch_add(1, Ordering::Relaxed);
                let delivery = Delivery::new(tag, exchange, routing_key, payload.clone(), properties.clone());
                if q.sender.send(delivery).is_err() {
                    trace!(queue = %queue, "Queue receiver dropped, message discarded");
                }
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock();
        let locked = match state.queues.get(queue) {
            None => return Err(TransportError::not_found("queue", queue)),
            Some(q) => self.locked_by_other(q),
        };
        if locked {
            return Err(TransportError::resource_locked(
                queue,
                "exclusive queue is owned by another connection",
            ));
        }

        let receiver = state
            .queues
            .get_mut(queue)
            .and_then(|q| q.receiver.take())
            .ok_or_else(|| TransportError::resource_locked(queue, "queue already has a consumer"))?;

        debug!(queue, consumer_tag, "Started in-memory consumer");
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|delivery| (Ok(delivery), receiver))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.broker.release(self.connection_id);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.broker.release(self.connection_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_payload(stream: &mut DeliveryStream) -> Bytes {
        stream.next().await.unwrap().unwrap().payload
    }

    #[tokio::test]
    async fn test_topic_routing() {
        let broker = InMemoryBroker::new("topic-routing");
        let channel = broker.connect();
        channel
            .declare_exchange("ns.services", ExchangeKind::Topic, ExchangeOptions::default())
            .await
            .unwrap();
        channel.declare_queue("q", QueueOptions::exclusive()).await.unwrap();
        channel.bind_queue("q", "ns.services", "ns.users").await.unwrap();

        let mut stream = channel.consume("q", "tag").await.unwrap();
        channel
            .publish("ns.services", "ns.orders", Bytes::from_static(b"miss"), MessageProperties::default())
            .await
            .unwrap();
        channel
            .publish("ns.services", "ns.users", Bytes::from_static(b"hit"), MessageProperties::default())
            .await
            .unwrap();

        assert_eq!(next_payload(&mut stream).await, Bytes::from_static(b"hit"));
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_queue() {
        let broker = InMemoryBroker::new("fanout");
        let channel = broker.connect();
        channel
            .declare_exchange("events", ExchangeKind::Fanout, ExchangeOptions::default())
            .await
            .unwrap();
        for q in ["a", "b"] {
            channel.declare_queue(q, QueueOptions::default()).await.unwrap();
            channel.bind_queue(q, "events", "").await.unwrap();
        }
        let mut a = channel.consume("a", "a").await.unwrap();
        let mut b = channel.consume("b", "b").await.unwrap();

        channel
            .publish("events", "whatever", Bytes::from_static(b"x"), MessageProperties::default())
            .await
            .unwrap();

        assert_eq!(next_payload(&mut a).await, Bytes::from_static(b"x"));
        assert_eq!(next_payload(&mut b).await, Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_overlapping_bindings_deliver_once() {
        let broker = InMemoryBroker::new("dedup");
        let channel = broker.connect();
        channel
            .declare_exchange("x", ExchangeKind::Topic, ExchangeOptions::default())
            .await
            .unwrap();
        channel.declare_queue("q", QueueOptions::default()).await.unwrap();
        channel.bind_queue("q", "x", "ns.#").await.unwrap();
        channel.bind_queue("q", "x", "ns.*").await.unwrap();
        let mut stream = channel.consume("q", "tag").await.unwrap();

        channel
            .publish("x", "ns.users", Bytes::from_static(b"1"), MessageProperties::default())
            .await
            .unwrap();
        channel
            .publish("x", "ns.users", Bytes::from_static(b"2"), MessageProperties::default())
            .await
            .unwrap();

        assert_eq!(next_payload(&mut stream).await, Bytes::from_static(b"1"));
        assert_eq!(next_payload(&mut stream).await, Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn test_default_exchange_keeps_properties() {
        let broker = InMemoryBroker::new("default-exchange");
        let channel = broker.connect();
        channel.declare_queue("reply", QueueOptions::exclusive()).await.unwrap();
        let mut stream = channel.consume("reply", "tag").await.unwrap();

        let props = MessageProperties::json().with_correlation_id("c-1").with_reply_to("other");
        channel
            .send_to_queue("reply", Bytes::from_static(b"{}"), props.clone())
            .await
            .unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.properties, props);
        assert_eq!(delivery.exchange, "");
        assert_eq!(delivery.routing_key, "reply");
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_queue_is_locked_to_its_connection() {
        let broker = InMemoryBroker::new("exclusive");
        let first = broker.connect();
        let second = broker.connect();
        first.declare_queue("private", QueueOptions::exclusive()).await.unwrap();

        let err = second.declare_queue("private", QueueOptions::exclusive()).await.unwrap_err();
        assert!(matches!(err, TransportError::ResourceLocked { .. }));
        assert!(second.consume("private", "tag").await.is_err());
    }

    #[tokio::test]
    async fn test_close_deletes_exclusive_queues_and_ends_stream() {
        let broker = InMemoryBroker::new("close");
        let channel = broker.connect();
        channel
            .declare_exchange("x", ExchangeKind::Topic, ExchangeOptions::default())
            .await
            .unwrap();
        channel.declare_queue("q", QueueOptions::exclusive()).await.unwrap();
        channel.bind_queue("q", "x", "ns").await.unwrap();
        let mut stream = channel.consume("q", "tag").await.unwrap();

        channel.close().await.unwrap();

        assert!(!broker.has_queue("q"));
        assert!(broker.bindings("x", "q").is_empty());
        assert!(stream.next().await.is_none());
        assert!(matches!(
            channel.publish("x", "ns", Bytes::new(), MessageProperties::default()).await,
            Err(TransportError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_to_missing_exchange() {
        let broker = InMemoryBroker::new("missing");
        let channel = broker.connect();
        let err = channel
            .publish("nope", "k", Bytes::new(), MessageProperties::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotFound { kind: "exchange", .. }));
    }

    #[tokio::test]
    async fn test_exchange_kind_mismatch() {
        let broker = InMemoryBroker::new("mismatch");
        let channel = broker.connect();
        channel
            .declare_exchange("x", ExchangeKind::Topic, ExchangeOptions::default())
            .await
            .unwrap();
        assert!(channel
            .declare_exchange("x", ExchangeKind::Fanout, ExchangeOptions::default())
            .await
            .is_err());
    }

    #[test]
    fn test_named_brokers_are_shared() {
        let a = InMemoryBroker::named("shared-table");
        let b = InMemoryBroker::named("shared-table");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &InMemoryBroker::named("other-table")));
    }
}
