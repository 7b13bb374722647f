//! # Mesh - Service Discovery And Remote Calls Over A Broker
//!
//! Peers announce themselves on a shared topic exchange (Hello, Welcome,
//! ServicesPublished), keep a registry of each other and install a
//! [`RemoteService`] facade for every service another peer publishes.
//! Calls on a facade travel over HTTP or broker RPC and fail with one
//! error taxonomy, [`ServiceError`], whatever the transport.
//!
//! ## Components
//!
//! - [`presence`]: consumer loop with typed handlers, publisher
//! - [`registry`]: last-write-wins peer table
//! - [`requester`]: HTTP and RPC transports, correlation table
//! - [`replier`]: answers RPC calls with local services
//! - [`app`]: host application holding local services and remote facades
//! - [`rest`]: axum surface the HTTP transport talks to
//! - [`microservice`]: wires all of the above for one peer
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mesh::{App, MemoryService, MicroService};
//! use mesh_config::MeshConfig;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), mesh::MeshError> {
//! let app = App::new();
//! app.use_service("users", Arc::new(MemoryService::new()));
//!
//! let config = MeshConfig {
//!     url: "memory://local".to_string(),
//!     publish: true,
//!     register: true,
//!     ..MeshConfig::default()
//! };
//! let peer = MicroService::init(app, config).await?;
//! peer.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod error;
pub mod error_handler;
pub mod identity;
pub mod microservice;
pub mod presence;
pub mod registry;
pub mod replier;
pub mod requester;
pub mod rest;
pub mod service;

pub use app::{App, ServiceHandle, ServiceHost};
pub use error::{ErrorKind, MeshError, RequestError, ServiceError};
pub use error_handler::map_request_error;
pub use identity::Identity;
pub use microservice::MicroService;
pub use presence::{Consumer, Publisher};
pub use registry::{PeerDescriptor, Registry};
pub use replier::Replier;
pub use requester::{create_requester, HttpRequester, PendingCalls, Requester, RequesterOptions, RpcRequester};
pub use service::{dispatch, MemoryService, Method, Params, RemoteService, Service, ServiceChange, ServiceRequest};
