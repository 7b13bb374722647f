//! Answers RPC requests with local services
//!
//! Failures never cross the transport as errors: they become an
//! `{error, code}` response payload. Every response echoes the request's
//! correlation id.
//!
//! Replies run on their own tasks, at most `max_in_flight` at a time. Once
//! every slot is taken the consume loop waits for one to free up before it
//! takes the next delivery.

use crate::app::ServiceHost;
use crate::error::{MeshError, ServiceError};
use crate::presence::{Consumer, Publisher, ReplyRouting};
use crate::service::{dispatch, Method, ServiceRequest};
use codec::{RpcRequestEvent, RpcResponseEvent};
use mesh_config::defaults;
use network::MessageProperties;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub struct Replier {
    host: Arc<dyn ServiceHost>,
    publisher: Arc<Publisher>,
    key: String,
    slots: Arc<Semaphore>,
    max_in_flight: usize,
}

impl Replier {
    pub fn new(host: Arc<dyn ServiceHost>, publisher: Arc<Publisher>, key: impl Into<String>) -> Arc<Self> {
        Self::limited(host, publisher, key, defaults::RPC_MAX_IN_FLIGHT)
    }

    /// Replier answering at most `max_in_flight` requests concurrently
    pub fn limited(
        host: Arc<dyn ServiceHost>,
        publisher: Arc<Publisher>,
        key: impl Into<String>,
        max_in_flight: usize,
    ) -> Arc<Self> {
        let max_in_flight = max_in_flight.max(1);
        Arc::new(Self {
            host,
            publisher,
            key: key.into(),
            slots: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        })
    }

    /// Replies currently being computed or sent
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.slots.available_permits()
    }

    /// Run `request` against the local service it names
    pub async fn respond(&self, request: &RpcRequestEvent) -> RpcResponseEvent {
        match self.invoke(request).await {
            Ok(result) => RpcResponseEvent::reply_to(request, Some(self.key.clone()), result),
            Err(e) => {
                debug!(correlation_id = %request.uuid, path = %request.call.path, error = %e, "RPC call failed");
                RpcResponseEvent::failure_to(request, Some(self.key.clone()), e.message(), e.code())
            }
        }
    }

    async fn invoke(&self, request: &RpcRequestEvent) -> Result<Value, ServiceError> {
        let call = &request.call;
        let method: Method = call.method.parse()?;
        let service = self.host.local_service(&call.path)?;

        let mut service_request = ServiceRequest::new(method, call.path.clone()).with_params(call.params.clone());
        service_request.id = call.id.clone().map(Value::String);
        service_request.data = call.data.clone();

        dispatch(service.as_ref(), service_request).await
    }

    /// Answer `request` on the caller's `reply_to` queue
    pub async fn reply(&self, request: &RpcRequestEvent, properties: &MessageProperties) -> Result<(), MeshError> {
        let Some(reply_to) = properties.reply_to.clone() else {
            warn!(correlation_id = %request.uuid, "RPC request without reply_to dropped");
            return Ok(());
        };
        let correlation_id = properties
            .correlation_id
            .clone()
            .unwrap_or_else(|| request.uuid.clone());

        let response = self.respond(request).await;
        self.publisher
            .respond_rpc(
                &response,
                &ReplyRouting {
                    reply_to,
                    correlation_id,
                },
            )
            .await
    }

    /// Wait for a free slot, then answer `request` on a task holding it
    pub async fn spawn_reply(
        self: &Arc<Self>,
        request: RpcRequestEvent,
        properties: MessageProperties,
    ) -> Option<JoinHandle<()>> {
        if self.slots.available_permits() == 0 {
            trace!(correlation_id = %request.uuid, limit = self.max_in_flight, "Waiting for a reply slot");
        }
        let Ok(slot) = Arc::clone(&self.slots).acquire_owned().await else {
            warn!(correlation_id = %request.uuid, "Reply slots closed, request dropped");
            return None;
        };
        let replier = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _slot = slot;
            if let Err(e) = replier.reply(&request, &properties).await {
                warn!(correlation_id = %request.uuid, "Failed to send RPC response: {}", e);
            }
        }))
    }

    /// Answer every RPC request reaching `consumer`
    ///
    /// Answers run on their own tasks, so a service that itself calls a
    /// remote service cannot stall the consume loop its response arrives on.
    pub fn install(self: &Arc<Self>, consumer: &Consumer) {
        let replier = Arc::clone(self);
        consumer.on_rpc_request(move |event, properties| {
            let replier = Arc::clone(&replier);
            async move {
                replier.spawn_reply(event, properties).await;
                Ok(())
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::service::{MemoryService, Params, Service};
    use async_trait::async_trait;
    use network::{BrokerChannel, InMemoryBroker};
    use serde_json::{json, Map};
    use std::time::Duration;
    use tokio::sync::Notify;

    async fn replier() -> Arc<Replier> {
        let app = App::new();
        app.use_service(
            "records",
            Arc::new(MemoryService::with_records([json!({"id": "0", "name": "One"})])),
        );
        let channel: Arc<dyn BrokerChannel> = Arc::new(InMemoryBroker::new("replier-unit").connect());
        let publisher = Arc::new(Publisher::new(channel, "x", ""));
        Replier::new(app, publisher, "replier")
    }

    fn request(method: &str, path: &str, id: Option<&str>) -> RpcRequestEvent {
        RpcRequestEvent::create(
            Some("caller".to_string()),
            method,
            path,
            id.map(str::to_string),
            None,
            Map::new(),
        )
    }

    #[tokio::test]
    async fn test_respond_with_result() {
        let replier = replier().await;
        let req = request("get", "records", Some("0"));

        let response = replier.respond(&req).await;

        assert_eq!(response.uuid, req.uuid);
        assert_eq!(response.key.as_deref(), Some("replier"));
        assert_eq!(response.result(), json!({"id": "0", "name": "One"}));
        assert!(response.failure().is_none());
    }

    #[tokio::test]
    async fn test_unknown_path_becomes_failure_payload() {
        let replier = replier().await;

        let response = replier.respond(&request("find", "nowhere", None)).await;

        let failure = response.failure().unwrap();
        assert_eq!(failure.message, "Can not find service 'nowhere'");
        assert_eq!(failure.code, Some(404));
    }

    #[tokio::test]
    async fn test_service_errors_become_failure_payload() {
        let replier = replier().await;

        let response = replier.respond(&request("get", "records", Some("9"))).await;
        let failure = response.failure().unwrap();
        assert_eq!(failure.message, "No record found for id '9'");
        assert_eq!(failure.code, Some(404));

        let response = replier.respond(&request("options", "records", None)).await;
        assert_eq!(response.failure().unwrap().code, Some(405));
    }

    /// Answers `find` only once the gate opens
    struct Gated {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl Service for Gated {
        async fn find(&self, _params: Params) -> Result<Value, ServiceError> {
            self.gate.notified().await;
            Ok(json!([]))
        }
    }

    #[tokio::test]
    async fn test_replies_beyond_the_limit_wait_for_a_slot() {
        let gate = Arc::new(Notify::new());
        let app = App::new();
        app.use_service("slow", Arc::new(Gated { gate: Arc::clone(&gate) }));
        let channel: Arc<dyn BrokerChannel> = Arc::new(InMemoryBroker::new("replier-limit").connect());
        let publisher = Arc::new(Publisher::new(channel, "x", ""));
        let replier = Replier::limited(app, publisher, "replier", 1);
        let properties = MessageProperties::default().with_reply_to("caller.1");

        let first = replier
            .spawn_reply(request("find", "slow", None), properties.clone())
            .await
            .unwrap();
        assert_eq!(replier.in_flight(), 1);

        let waiting = {
            let replier = Arc::clone(&replier);
            let properties = properties.clone();
            tokio::spawn(async move { replier.spawn_reply(request("find", "slow", None), properties).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        gate.notify_one();
        first.await.unwrap();
        let second = waiting.await.unwrap().unwrap();
        assert_eq!(replier.in_flight(), 1);

        gate.notify_one();
        second.await.unwrap();
        assert_eq!(replier.in_flight(), 0);
    }
}
