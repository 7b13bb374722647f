//! # MicroService
//!
//! Wires one peer onto the mesh: connects, declares its topology, registers
//! the presence handlers, starts the consume loop and announces itself.
//!
//! ## Lifecycle
//!
//! 1. validate configuration, connect, declare exchange and private queue
//! 2. register Hello / Welcome / ServicesPublished / RPC / ServiceEvent handlers
//! 3. start consuming, then broadcast Hello; every foreign Hello is
//!    answered with a Welcome
//! 4. with `publish` on: answer RPC requests, broadcast ServicesPublished
//!    and forward local state changes as ServiceEvent
//!
//! Handlers hold a `Weak` reference back to the instance so dropping the
//! last `Arc` releases everything even while the consume loop is running.

use crate::app::ServiceHost;
use crate::error::{MeshError, RequestError, ServiceError};
use crate::identity::Identity;
use crate::presence::{Consumer, Publisher};
use crate::registry::{PeerDescriptor, Registry};
use crate::replier::Replier;
use crate::requester::{
    create_requester, install_response_handler, CurrentPeer, PendingCalls, RemoteTarget, RequesterOptions, RpcLink,
};
use crate::service::{RemoteService, ServiceChange};
use codec::{HelloEvent, Presence, ServiceDescriptor, ServiceEvent, ServicesPublishedEvent, WelcomeEvent};
use mesh_config::MeshConfig;
use network::{BrokerChannel, ConnectOptions, PeerTopology, TransportError};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct MicroService {
    identity: Identity,
    config: MeshConfig,
    host: Arc<dyn ServiceHost>,
    channel: Arc<dyn BrokerChannel>,
    topology: PeerTopology,
    consumer: Consumer,
    publisher: Arc<Publisher>,
    registry: Registry,
    pending: Arc<PendingCalls>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl MicroService {
    pub async fn init(host: Arc<dyn ServiceHost>, config: MeshConfig) -> Result<Arc<Self>, MeshError> {
        config
            .validate()
            .map_err(|e| ServiceError::not_acceptable(e.to_string()))?;

        let identity = Identity::resolve(&config);
        let topology = identity.topology(&config.exchange);

        info!(url = %config.url, name = %identity.connection_name(), "Connecting to broker");
        let channel = network::connect(
            &config.url,
            ConnectOptions {
                connection_name: Some(identity.connection_name()),
            },
        )
        .await
        .map_err(|e| broker_failure("connect", e))?;
        topology
            .declare(channel.as_ref())
            .await
            .map_err(|e| broker_failure("declare topology", e))?;

        let consumer = Consumer::new(Arc::clone(&channel), topology.queue(), identity.key.clone());
        let publisher = Arc::new(Publisher::for_topology(Arc::clone(&channel), &topology));
        let pending = PendingCalls::new(config.rpc_timeout());

        let service = Arc::new(Self {
            identity,
            config,
            host,
            channel,
            topology,
            consumer,
            publisher,
            registry: Registry::new(),
            pending,
            forwarder: Mutex::new(None),
        });

        service.register_handlers();
        if service.config.publish {
            Replier::limited(
                Arc::clone(&service.host),
                Arc::clone(&service.publisher),
                service.identity.key.clone(),
                service.config.rpc.max_in_flight,
            )
            .install(&service.consumer);
        }
        service.consumer.start().await?;

        service.publish_app().await?;
        if service.config.publish {
            service.publish_services().await?;
            service.start_forwarder();
        }

        info!(
            key = %service.identity.key,
            queue = %service.topology.queue(),
            publish = service.config.publish,
            register = service.config.register,
            "Joined mesh"
        );
        Ok(service)
    }

    fn register_handlers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.consumer.on_hello(move |event, _| {
            let this = weak.clone();
            async move {
                if let Some(this) = this.upgrade() {
                    this.registry.register(PeerDescriptor::from(&event));
                    this.publish_for_newcomers().await?;
                }
                Ok::<_, anyhow::Error>(())
            }
        });

        let weak = Arc::downgrade(self);
        self.consumer.on_welcome(move |event, _| {
            let this = weak.clone();
            async move {
                if let Some(this) = this.upgrade() {
                    this.registry.register(PeerDescriptor::from(&event));
                    if this.config.register {
                        this.install_services(&event.services)?;
                    }
                }
                Ok::<_, anyhow::Error>(())
            }
        });

        if self.config.register {
            let weak = Arc::downgrade(self);
            self.consumer.on_services_published(move |event, _| {
                let this = weak.clone();
                async move {
                    if let Some(this) = this.upgrade() {
                        this.install_services(&event.services)?;
                    }
                    Ok::<_, anyhow::Error>(())
                }
            });

            let weak = Arc::downgrade(self);
            self.consumer.on_service_event(move |event, _| {
                let this = weak.clone();
                async move {
                    if let Some(this) = this.upgrade() {
                        this.route_service_event(event);
                    }
                    Ok(())
                }
            });
        }

        install_response_handler(&self.consumer, Arc::clone(&self.pending));

        self.consumer.on_unknown_published(|envelope, _| async move {
            debug!(name = %envelope.name, "Ignored envelope");
            Ok(())
        });
    }

    fn presence(&self) -> Presence {
        Presence::new(self.identity.host.clone(), self.config.kind)
            .with_queue(self.topology.queue())
            .with_roles(self.config.register, self.config.publish)
    }

    /// Descriptors of every local service
    pub fn local_services(&self) -> Vec<ServiceDescriptor> {
        self.host
            .local_paths()
            .into_iter()
            .map(|path| {
                ServiceDescriptor::advertise(
                    path,
                    self.identity.key.clone(),
                    self.identity.service.clone(),
                    Some(self.identity.host.clone()),
                )
            })
            .collect()
    }

    async fn publish_app(&self) -> Result<(), MeshError> {
        let event = HelloEvent::create(self.identity.id.clone(), self.identity.key.clone(), self.presence());
        self.publisher.emit_greet(&event).await
    }

    /// Broadcast the local service list
    pub async fn publish_services(&self) -> Result<(), MeshError> {
        let services = self.local_services();
        info!(count = services.len(), "Publishing services");
        let event = ServicesPublishedEvent::create(
            self.identity.id.clone(),
            self.identity.key.clone(),
            Some(self.identity.host.clone()),
            services,
        );
        self.publisher.emit_services(&event).await
    }

    /// Answer a Hello; only publishing peers list their services
    async fn publish_for_newcomers(&self) -> Result<(), MeshError> {
        let services = if self.config.publish {
            self.local_services()
        } else {
            Vec::new()
        };
        let event = WelcomeEvent::create(
            self.identity.id.clone(),
            self.identity.key.clone(),
            self.presence(),
            services,
        );
        self.publisher.emit_welcome(&event).await
    }

    /// Install one facade per descriptor at `<service>::<path>`, replacing
    /// any facade already there
    pub fn install_services(&self, services: &[ServiceDescriptor]) -> Result<(), MeshError> {
        for descriptor in services {
            let peer = self.registry.get(&descriptor.key);
            let kind = peer.as_ref().map_or(self.config.kind, |p| p.kind);
            let host = descriptor
                .host
                .clone()
                .or_else(|| peer.as_ref().map(|p| p.host.clone()));

            let options = RequesterOptions {
                current: CurrentPeer {
                    key: self.identity.key.clone(),
                    namespace: self.identity.namespace.clone(),
                    queue: self.topology.queue().to_string(),
                },
                remote: RemoteTarget {
                    key: descriptor.key.clone(),
                    service: descriptor.service.clone(),
                    host,
                    kind,
                },
                http: self.config.http.clone(),
            };
            let link = RpcLink {
                publisher: Arc::clone(&self.publisher),
                pending: Arc::clone(&self.pending),
            };
            let requester = create_requester(options, Some(link))?;

            let mut facade = RemoteService::new(descriptor.path.clone(), requester);
            if self.config.public {
                facade = facade.with_public(descriptor.public_path());
            }
            let facade = Arc::new(facade);

            let register_path = descriptor.register_path();
            if self.host.register_remote(&register_path, Arc::clone(&facade)).is_some() {
                debug!(path = %register_path, "Replaced remote service");
            }
            if let Some(public) = facade.public_path() {
                self.host.register_remote(public, Arc::clone(&facade));
            }
            info!(path = %register_path, transport = %kind, "Registered remote service");
        }
        Ok(())
    }

    fn route_service_event(&self, event: ServiceEvent) {
        let path = event.register_path();
        match self.host.remote_service(&path) {
            Some(facade) => {
                facade.notify(ServiceChange {
                    path: event.path,
                    event: event.event,
                    data: event.data,
                });
            }
            None => debug!(path = %path, event = %event.event, "Service event for unknown remote service"),
        }
    }

    fn start_forwarder(self: &Arc<Self>) {
        let mut changes = self.host.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Service event forwarder lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(this) = weak.upgrade() else {
                    break;
                };
                let event = ServiceEvent::create(
                    this.identity.id.clone(),
                    this.identity.key.clone(),
                    Some(this.identity.host.clone()),
                    this.identity.service.clone(),
                    change.path,
                    change.event,
                    change.data,
                );
                if let Err(e) = this.publisher.emit_service_event(&event).await {
                    warn!(path = %event.path, "Failed to forward service event: {}", e);
                }
            }
        });
        *self.forwarder.lock() = Some(task);
    }

    /// Stop consuming, fail pending calls and close the channel
    pub async fn shutdown(&self) -> Result<(), MeshError> {
        self.consumer.stop();
        if let Some(task) = self.forwarder.lock().take() {
            task.abort();
        }
        let failed = self
            .pending
            .fail_all(|| RequestError::aborted("ESHUTDOWN", "Mesh peer is shutting down"));
        if failed > 0 {
            warn!(failed, "Failed pending RPC calls on shutdown");
        }
        if self.channel.is_open() {
            self.channel.close().await?;
        }
        info!(key = %self.identity.key, "Left mesh");
        Ok(())
    }

    /// False once the broker channel has been closed
    pub fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn topology(&self) -> &PeerTopology {
        &self.topology
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }

    pub fn pending_calls(&self) -> &Arc<PendingCalls> {
        &self.pending
    }
}

fn broker_failure(operation: &str, e: TransportError) -> TransportError {
    error!(
        operation,
        category = e.category(),
        transient = e.is_transient(),
        "Broker {} failed: {}",
        operation,
        e
    );
    e
}

impl Drop for MicroService {
    fn drop(&mut self) {
        if let Some(task) = self.forwarder.lock().take() {
            task.abort();
        }
    }
}
