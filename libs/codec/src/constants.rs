//! # Wire Constants
//!
//! Envelope names and the advertised service surface. Envelope names are part
//! of the wire contract: peers running different builds dispatch on them, so
//! they must never change.

/// Announces a newly started peer.
pub const HELLO_EVENT: &str = "HelloEvent";

/// Answer to a Hello from an already running, publishing peer.
pub const WELCOME_EVENT: &str = "WelcomeEvent";

/// Full listing of the services hosted by a peer.
pub const SERVICES_PUBLISHED_EVENT: &str = "ServicesPublishedEvent";

/// Correlated call into a remote service.
pub const RPC_REQUEST_EVENT: &str = "RPCRequestEvent";

/// Answer to an [`RPC_REQUEST_EVENT`], carrying the same correlation id.
pub const RPC_RESPONSE_EVENT: &str = "RPCResponseEvent";

/// State change (created/updated/patched/removed) of a published service.
pub const SERVICE_EVENT: &str = "ServiceEvent";

/// Methods advertised for every published service. `update` is callable over
/// both transports but deliberately not advertised.
pub const ADVERTISED_METHODS: [&str; 5] = ["find", "get", "create", "patch", "remove"];

/// Events advertised for every published service.
pub const ADVERTISED_EVENTS: [&str; 4] = ["created", "updated", "patched", "removed"];
