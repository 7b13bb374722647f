//! Remote service facade
//!
//! Stands in for a service hosted by another peer. Every operation goes
//! through the requester and every failure through
//! [`map_request_error`], so callers see one error taxonomy whatever the
//! transport. State changes forwarded by the hosting peer are re-broadcast
//! to local subscribers.

use super::{Method, Params, Service, ServiceChange, ServiceRequest};
use crate::error::ServiceError;
use crate::error_handler::map_request_error;
use crate::requester::Requester;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

pub struct RemoteService {
    /// Path of the service on the hosting peer
    path: String,
    requester: Arc<dyn Requester>,
    /// Extra externally routable path, set when remote services are public
    public: Option<String>,
    events: broadcast::Sender<ServiceChange>,
}

impl RemoteService {
    pub fn new(path: impl Into<String>, requester: Arc<dyn Requester>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            path: path.into(),
            requester,
            public: None,
            events,
        }
    }

    pub fn with_public(mut self, public_path: impl Into<String>) -> Self {
        self.public = Some(public_path.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn public_path(&self) -> Option<&str> {
        self.public.as_deref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceChange> {
        self.events.subscribe()
    }

    /// Re-broadcast a change raised on the hosting peer; returns the number of receivers
    pub fn notify(&self, change: ServiceChange) -> usize {
        self.events.send(change).unwrap_or(0)
    }

    async fn call(&self, request: ServiceRequest) -> Result<Value, ServiceError> {
        let method = request.method;
        debug!(path = %self.path, %method, transport = %self.requester.kind(), "Calling remote service");
        self.requester.send(request).await.map_err(|e| {
            let mapped = map_request_error(e);
            debug!(path = %self.path, %method, error = %mapped, "Remote call failed");
            mapped
        })
    }

    fn request(&self, method: Method, params: Params) -> ServiceRequest {
        ServiceRequest::new(method, self.path.clone()).with_params(params)
    }
}

#[async_trait]
impl Service for RemoteService {
    async fn find(&self, params: Params) -> Result<Value, ServiceError> {
        self.call(self.request(Method::Find, params)).await
    }

    async fn get(&self, id: Value, params: Params) -> Result<Value, ServiceError> {
        self.call(self.request(Method::Get, params).with_id(id)).await
    }

    async fn create(&self, data: Value, params: Params) -> Result<Value, ServiceError> {
        self.call(self.request(Method::Create, params).with_data(data)).await
    }

    async fn update(&self, id: Value, data: Value, params: Params) -> Result<Value, ServiceError> {
        self.call(self.request(Method::Update, params).with_id(id).with_data(data))
            .await
    }

    async fn patch(&self, id: Value, data: Value, params: Params) -> Result<Value, ServiceError> {
        self.call(self.request(Method::Patch, params).with_id(id).with_data(data))
            .await
    }

    async fn remove(&self, id: Value, params: Params) -> Result<Value, ServiceError> {
        self.call(self.request(Method::Remove, params).with_id(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, RequestError};
    use codec::TransportKind;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Requester that records calls and answers with a canned result
    struct Scripted {
        calls: Mutex<Vec<ServiceRequest>>,
        answer: fn() -> Result<Value, RequestError>,
    }

    impl Scripted {
        fn new(answer: fn() -> Result<Value, RequestError>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                answer,
            })
        }
    }

    #[async_trait]
    impl Requester for Scripted {
        fn kind(&self) -> TransportKind {
            TransportKind::Http
        }

        async fn send(&self, request: ServiceRequest) -> Result<Value, RequestError> {
            self.calls.lock().push(request);
            (self.answer)()
        }
    }

    #[tokio::test]
    async fn test_operations_carry_their_arguments() {
        let requester = Scripted::new(|| Ok(json!({"ok": true})));
        let service = RemoteService::new("users", requester.clone());

        service.patch(json!("3"), json!({"name": "Three"}), Params::new()).await.unwrap();
        service.find(Params::new()).await.unwrap();

        let calls = requester.calls.lock();
        assert_eq!(calls[0].method, Method::Patch);
        assert_eq!(calls[0].path, "users");
        assert_eq!(calls[0].id, Some(json!("3")));
        assert_eq!(calls[0].data, Some(json!({"name": "Three"})));
        assert_eq!(calls[1].method, Method::Find);
        assert_eq!(calls[1].id, None);
    }

    #[tokio::test]
    async fn test_not_found_response_maps_to_not_found() {
        let requester = Scripted::new(|| {
            Err(RequestError::Response {
                status: 404,
                data: json!({"message": "gone"}),
            })
        });
        let service = RemoteService::new("users", requester);

        let err = service.get(json!("1"), Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_abort_maps_to_gateway_timeout() {
        let requester = Scripted::new(|| Err(RequestError::aborted("ECONNABORTED", "timeout of 10ms exceeded")));
        let service = RemoteService::new("users", requester);

        let err = service.find(Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GatewayTimeout);
    }

    #[tokio::test]
    async fn test_network_error_maps_to_bad_gateway() {
        let requester = Scripted::new(|| Err(RequestError::network("connection refused")));
        let service = RemoteService::new("users", requester);

        let err = service.remove(json!(1), Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadGateway);
    }

    #[tokio::test]
    async fn test_rpc_timeout_maps_to_timeout() {
        let requester = Scripted::new(|| {
            Err(RequestError::Response {
                status: 408,
                data: json!({"status": 408, "message": "Request timed out"}),
            })
        });
        let service = RemoteService::new("users", requester);

        let err = service.get(json!("0"), Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.message(), "Request timed out");
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let service = RemoteService::new("users", Scripted::new(|| Ok(Value::Null)));
        let mut events = service.subscribe();

        let delivered = service.notify(ServiceChange {
            path: "users".to_string(),
            event: "created".to_string(),
            data: json!({"id": "9"}),
        });

        assert_eq!(delivered, 1);
        assert_eq!(events.recv().await.unwrap().event, "created");
    }
}
