//! # Host Application
//!
//! Holds local services and remote facades in separate tables so the mesh
//! can tell which is which without intercepting a single lookup.
//! Local services are wrapped in a [`ServiceHandle`] that publishes a
//! [`ServiceChange`] on the application bus after each successful
//! mutating call, whichever surface the call came through.

use crate::error::ServiceError;
use crate::service::{strip_slashes, Method, Params, RemoteService, Service, ServiceChange};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

const BUS_CAPACITY: usize = 1024;

/// Lookup and registration primitives the mesh needs from its host
pub trait ServiceHost: Send + Sync {
    /// Local service at `path`, NotFound when there is none
    fn local_service(&self, path: &str) -> Result<Arc<dyn Service>, ServiceError>;

    fn remote_service(&self, path: &str) -> Option<Arc<RemoteService>>;

    /// Install `facade` at `path`, returning the facade it replaced
    fn register_remote(&self, path: &str, facade: Arc<RemoteService>) -> Option<Arc<RemoteService>>;

    fn unregister_remote(&self, path: &str) -> Option<Arc<RemoteService>>;

    fn local_paths(&self) -> Vec<String>;

    /// State changes of local services
    fn subscribe(&self) -> broadcast::Receiver<ServiceChange>;
}

/// Local service plus the bus its changes go to
pub struct ServiceHandle {
    path: String,
    inner: Arc<dyn Service>,
    bus: broadcast::Sender<ServiceChange>,
}

impl ServiceHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn emit(&self, method: Method, result: &Value) {
        let Some(event) = method.event() else {
            return;
        };
        let records = match (method, result) {
            (Method::Create, Value::Array(items)) => items.clone(),
            _ => vec![result.clone()],
        };
        for data in records {
            // No receivers is fine
            let _ = self.bus.send(ServiceChange {
                path: self.path.clone(),
                event: event.to_string(),
                data,
            });
        }
    }

    fn emitted(&self, method: Method, result: Result<Value, ServiceError>) -> Result<Value, ServiceError> {
        if let Ok(value) = &result {
            self.emit(method, value);
        }
        result
    }
}

#[async_trait]
impl Service for ServiceHandle {
    async fn find(&self, params: Params) -> Result<Value, ServiceError> {
        self.inner.find(params).await
    }

    async fn get(&self, id: Value, params: Params) -> Result<Value, ServiceError> {
        self.inner.get(id, params).await
    }

    async fn create(&self, data: Value, params: Params) -> Result<Value, ServiceError> {
        let result = self.inner.create(data, params).await;
        self.emitted(Method::Create, result)
    }

    async fn update(&self, id: Value, data: Value, params: Params) -> Result<Value, ServiceError> {
        let result = self.inner.update(id, data, params).await;
        self.emitted(Method::Update, result)
    }

    async fn patch(&self, id: Value, data: Value, params: Params) -> Result<Value, ServiceError> {
        let result = self.inner.patch(id, data, params).await;
        self.emitted(Method::Patch, result)
    }

    async fn remove(&self, id: Value, params: Params) -> Result<Value, ServiceError> {
        let result = self.inner.remove(id, params).await;
        self.emitted(Method::Remove, result)
    }
}

pub struct App {
    local: DashMap<String, Arc<ServiceHandle>>,
    remote: DashMap<String, Arc<RemoteService>>,
    bus: broadcast::Sender<ServiceChange>,
}

impl Default for App {
    fn default() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            local: DashMap::new(),
            remote: DashMap::new(),
            bus,
        }
    }
}

impl App {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mount a local service at `path`
    pub fn use_service(&self, path: &str, service: Arc<dyn Service>) -> Arc<ServiceHandle> {
        let path = strip_slashes(path).to_string();
        let handle = Arc::new(ServiceHandle {
            path: path.clone(),
            inner: service,
            bus: self.bus.clone(),
        });
        self.local.insert(path.clone(), Arc::clone(&handle));
        info!(path = %path, "Mounted local service");
        handle
    }

    /// Local service at `path`, else the remote facade installed there
    pub fn service(&self, path: &str) -> Option<Arc<dyn Service>> {
        let path = strip_slashes(path);
        if let Some(local) = self.local.get(path) {
            return Some(Arc::clone(local.value()) as Arc<dyn Service>);
        }
        self.remote
            .get(path)
            .map(|remote| Arc::clone(remote.value()) as Arc<dyn Service>)
    }

    pub fn remote_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.remote.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }
}

impl ServiceHost for App {
    fn local_service(&self, path: &str) -> Result<Arc<dyn Service>, ServiceError> {
        let path = strip_slashes(path);
        self.local
            .get(path)
            .map(|handle| Arc::clone(handle.value()) as Arc<dyn Service>)
            .ok_or_else(|| ServiceError::not_found(format!("Can not find service '{}'", path)))
    }

    fn remote_service(&self, path: &str) -> Option<Arc<RemoteService>> {
        self.remote.get(strip_slashes(path)).map(|r| Arc::clone(r.value()))
    }

    fn register_remote(&self, path: &str, facade: Arc<RemoteService>) -> Option<Arc<RemoteService>> {
        let path = strip_slashes(path).to_string();
        debug!(path = %path, "Installed remote service");
        self.remote.insert(path, facade)
    }

    fn unregister_remote(&self, path: &str) -> Option<Arc<RemoteService>> {
        self.remote.remove(strip_slashes(path)).map(|(_, facade)| facade)
    }

    fn local_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.local.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    fn subscribe(&self) -> broadcast::Receiver<ServiceChange> {
        self.bus.subscribe()
    }
}
