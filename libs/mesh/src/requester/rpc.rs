//! Broker transport
//!
//! Requests are published on the target service's topic with the caller's
//! private queue as `reply_to`. The answer comes back through the presence
//! consumer, whose single `on_rpc_response` handler (installed once per
//! instance by [`install_response_handler`]) retires the pending call.

use super::{filter_params, PendingCalls, Requester, RequesterOptions, RpcLink};
use crate::error::RequestError;
use crate::presence::{Consumer, Publisher, RpcRouting};
use crate::service::{id_to_string, ServiceRequest};
use async_trait::async_trait;
use codec::{Event, RpcRequestEvent, TransportKind};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

pub struct RpcRequester {
    key: String,
    topic: String,
    reply_to: String,
    exclude_params: Vec<String>,
    publisher: Arc<Publisher>,
    pending: Arc<PendingCalls>,
}

impl RpcRequester {
    pub fn new(options: RequesterOptions, link: RpcLink) -> Self {
        let namespace = options.current.namespace.as_deref().unwrap_or("");
        Self {
            topic: network::scoped(namespace, &[options.remote.service.as_str()]),
            key: options.current.key,
            reply_to: options.current.queue,
            exclude_params: options.http.exclude_params,
            publisher: link.publisher,
            pending: link.pending,
        }
    }

    /// Routing key requests are published with: `<namespace>.<service>`
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Requester for RpcRequester {
    fn kind(&self) -> TransportKind {
        TransportKind::Rpc
    }

    async fn send(&self, request: ServiceRequest) -> Result<Value, RequestError> {
        let id = request.id.as_ref().filter(|id| !id.is_null()).map(id_to_string);
        let params = filter_params(&request.params, &self.exclude_params);
        let event = RpcRequestEvent::create(
            Some(self.key.clone()),
            request.method.as_str(),
            request.path,
            id,
            request.data,
            params,
        );
        let correlation_id = event.correlation_id().to_string();

        let completion = self
            .pending
            .register(&correlation_id, event.to_envelope().to_json());
        let routing = RpcRouting {
            topic: self.topic.clone(),
            correlation_id: correlation_id.clone(),
            reply_to: self.reply_to.clone(),
        };
        if let Err(e) = self.publisher.request_rpc(&event, &routing).await {
            self.pending.cancel(&correlation_id);
            return Err(e.into());
        }
        trace!(correlation_id = %correlation_id, method = %event.call.method, path = %event.call.path, "Awaiting RPC response");

        completion
            .await
            .map_err(|_| RequestError::network("RPC call dropped before completion"))?
    }
}

/// Resolve pending calls from RPC responses arriving at `consumer`
pub fn install_response_handler(consumer: &Consumer, pending: Arc<PendingCalls>) {
    consumer.on_rpc_response(move |event, properties| {
        let pending = Arc::clone(&pending);
        async move {
            let correlation_id = properties
                .correlation_id
                .unwrap_or_else(|| event.correlation_id().to_string());
            let result = match event.failure() {
                Some(failure) => Err(RequestError::Remote {
                    message: failure.message,
                    code: failure.code,
                }),
                None => Ok(event.result()),
            };
            if !pending.complete(&correlation_id, result) {
                debug!(correlation_id = %correlation_id, "Late or foreign RPC response");
            }
            Ok(())
        }
    });
}
