//! # Presence Consumer
//!
//! Single consumption loop over the peer's private queue. For every delivery,
//! in broker order:
//!
//! 1. parse the envelope; drop it when its `key` is our own
//! 2. decode it into an [`InboundEvent`]
//! 3. await every handler registered for that kind, in registration order;
//!    kinds without handlers go to the `on_unknown_published` handlers
//! 4. acknowledge, whatever the handlers did
//!
//! Handler errors and panics are logged and never stop the loop. A handler
//! that awaits an RPC response blocks the loop that would deliver it, so
//! long-running work belongs in a spawned task.

use crate::error::MeshError;
use codec::{
    Envelope, HelloEvent, InboundEvent, RpcRequestEvent, RpcResponseEvent, ServiceEvent, ServicesPublishedEvent,
    WelcomeEvent,
};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use network::{BrokerChannel, Delivery, DeliveryStream, MessageProperties};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Boxed async callback receiving one event and its delivery properties
pub type Handler<E> = Arc<dyn Fn(E, MessageProperties) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

fn boxed<E, F, Fut>(handler: F) -> Handler<E>
where
    F: Fn(E, MessageProperties) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event, properties| handler(event, properties).boxed())
}

#[derive(Default)]
struct Handlers {
    hello: Vec<Handler<HelloEvent>>,
    welcome: Vec<Handler<WelcomeEvent>>,
    services_published: Vec<Handler<ServicesPublishedEvent>>,
    rpc_request: Vec<Handler<RpcRequestEvent>>,
    rpc_response: Vec<Handler<RpcResponseEvent>>,
    service_event: Vec<Handler<ServiceEvent>>,
    unknown: Vec<Handler<Envelope>>,
}

pub struct Consumer {
    channel: Arc<dyn BrokerChannel>,
    queue: String,
    key: String,
    handlers: Arc<RwLock<Handlers>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

macro_rules! register {
    ($(#[$doc:meta])* $method:ident, $field:ident, $event:ty) => {
        $(#[$doc])*
        pub fn $method<F, Fut>(&self, handler: F)
        where
            F: Fn($event, MessageProperties) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        {
            self.handlers.write().$field.push(boxed(handler));
        }
    };
}

impl Consumer {
    /// Consumer of `queue` that ignores envelopes carrying `key`
    pub fn new(channel: Arc<dyn BrokerChannel>, queue: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            channel,
            queue: queue.into(),
            key: key.into(),
            handlers: Arc::new(RwLock::new(Handlers::default())),
            task: Mutex::new(None),
        }
    }

    register!(on_hello, hello, HelloEvent);
    register!(on_welcome, welcome, WelcomeEvent);
    register!(on_services_published, services_published, ServicesPublishedEvent);
    register!(on_rpc_request, rpc_request, RpcRequestEvent);
    register!(on_rpc_response, rpc_response, RpcResponseEvent);
    register!(on_service_event, service_event, ServiceEvent);
    register!(
        /// Envelopes of unknown kinds, or of kinds nobody registered for
        on_unknown_published,
        unknown,
        Envelope
    );

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Start the consumption loop; a second call is a no-op
    pub async fn start(&self) -> Result<(), MeshError> {
        if self.is_running() {
            return Ok(());
        }
        let stream = self.channel.consume(&self.queue, &self.key).await?;
        let handlers = Arc::clone(&self.handlers);
        let key = self.key.clone();
        let queue = self.queue.clone();

        let task = tokio::spawn(consume_loop(stream, key, handlers));
        *self.task.lock() = Some(task);
        info!(queue = %queue, "Presence consumer started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Abort the consumption loop
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!(queue = %self.queue, "Presence consumer stopped");
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn consume_loop(mut stream: DeliveryStream, key: String, handlers: Arc<RwLock<Handlers>>) {
    while let Some(next) = stream.next().await {
        let delivery = match next {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(
                    category = e.category(),
                    transient = e.is_transient(),
                    error = %e,
                    "Failed to receive delivery"
                );
                continue;
            }
        };

        process(&delivery, &key, &handlers).await;

        if let Err(e) = delivery.ack().await {
            warn!(delivery_tag = delivery.delivery_tag, error = %e, "Failed to acknowledge delivery");
        }
    }
    debug!("Delivery stream ended");
}

async fn process(delivery: &Delivery, key: &str, handlers: &RwLock<Handlers>) {
    let envelope = match Envelope::from_slice(&delivery.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, routing_key = %delivery.routing_key, "Dropped malformed envelope");
            return;
        }
    };

    if envelope.is_from(key) {
        trace!(name = %envelope.name, "Ignored own envelope");
        return;
    }

    let properties = delivery.properties.clone();
    let event = match InboundEvent::decode(envelope.clone()) {
        Ok(event) => event,
        Err(e) => {
            warn!(name = %envelope.name, error = %e, "Dropped undecodable envelope");
            return;
        }
    };

    trace!(name = event.name(), "Dispatching envelope");
    // Snapshot the handler list so no lock is held while handlers run
    let dispatched = match event {
        InboundEvent::Hello(e) => {
            let list = handlers.read().hello.clone();
            run(&list, e, &properties).await
        }
        InboundEvent::Welcome(e) => {
            let list = handlers.read().welcome.clone();
            run(&list, e, &properties).await
        }
        InboundEvent::ServicesPublished(e) => {
            let list = handlers.read().services_published.clone();
            run(&list, e, &properties).await
        }
        InboundEvent::RpcRequest(e) => {
            let list = handlers.read().rpc_request.clone();
            run(&list, e, &properties).await
        }
        InboundEvent::RpcResponse(e) => {
            let list = handlers.read().rpc_response.clone();
            run(&list, e, &properties).await
        }
        InboundEvent::Service(e) => {
            let list = handlers.read().service_event.clone();
            run(&list, e, &properties).await
        }
        InboundEvent::Unknown(_) => false,
    };

    if !dispatched {
        let unknown = handlers.read().unknown.clone();
        if unknown.is_empty() {
            trace!(name = %envelope.name, "No handler for envelope");
        }
        run(&unknown, envelope, &properties).await;
    }
}

/// Await every handler in order; false when there were none
async fn run<E: Clone + Send + 'static>(list: &[Handler<E>], event: E, properties: &MessageProperties) -> bool {
    for handler in list {
        let (event, properties) = (event.clone(), properties.clone());
        let call = AssertUnwindSafe(async move { handler(event, properties).await }).catch_unwind();
        match call.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Presence handler failed"),
            Err(_) => error!("Presence handler panicked"),
        }
    }
    !list.is_empty()
}
