//! Default configuration values
//!
//! Constants shared by the config loader, the mesh runtime and the binary so
//! every peer of a deployment agrees on them.

/// Broker used when none is configured
pub const BROKER_URL: &str = "amqp://localhost:5672";

/// Topic exchange name, prefixed by the namespace when one is set
pub const EXCHANGE: &str = "microservices-services";

/// RPC calls not answered within this window fail with 408
pub const RPC_TIMEOUT_MS: u64 = 5_000;

/// RPC requests a publishing peer answers concurrently before it stops
/// taking new ones off its queue
pub const RPC_MAX_IN_FLIGHT: usize = 64;

/// HTTP transport defaults
pub mod http {
    pub const PROTOCOL: &str = "http";

    /// 0 disables the per-call timeout
    pub const TIMEOUT_MS: u64 = 0;

    /// Header carrying the caller's filtered params to the remote side
    pub const INTERNAL_REQUEST_HEADER: &str = "X-Internal-Request";

    /// Framework-internal params never forwarded to a remote service
    pub const EXCLUDE_PARAMS: [&str; 3] = ["provider", "connection", "resolve"];
}

/// Environment variable prefix for overrides (`MESH_NAMESPACE`, `MESH_HTTP__PORT`, ...)
pub const ENV_PREFIX: &str = "MESH";
