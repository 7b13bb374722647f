//! Mesh Configuration Module
//!
//! Loads [`MeshConfig`] from an optional TOML file with environment
//! overrides on top. Nested keys use a double underscore in variable names,
//! so `MESH_RPC__TIMEOUT_MS=2000` sets `rpc.timeout_ms`.

use crate::defaults;
use anyhow::{Context, Result};
use codec::TransportKind;
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Settings of one mesh peer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Process instance id, random when unset
    pub id: Option<String>,
    /// Logical peer identity, falls back to `host`
    pub key: Option<String>,
    pub namespace: Option<String>,
    pub url: String,
    /// Install facades for services other peers publish
    pub register: bool,
    /// Announce local services and answer RPC calls for them
    pub publish: bool,
    pub host: Option<String>,
    pub service: Option<String>,
    pub exchange: String,
    /// Transport other peers should use to reach this one
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// Also expose remote services at `/<service>/<path>`
    pub public: bool,
    pub debug: bool,
    pub rpc: RpcSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcSettings {
    pub timeout_ms: u64,
    /// Concurrent replies before the consume loop waits for a free slot
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSettings {
    pub protocol: String,
    pub port: Option<u16>,
    pub dns_suffix: Option<String>,
    pub timeout_ms: u64,
    pub proxy: Option<String>,
    pub max_redirects: Option<usize>,
    pub keep_alive: bool,
    pub exclude_params: Vec<String>,
    pub internal_request_header: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            id: None,
            key: None,
            namespace: None,
            url: defaults::BROKER_URL.to_string(),
            register: false,
            publish: false,
            host: None,
            service: None,
            exchange: defaults::EXCHANGE.to_string(),
            kind: TransportKind::Rpc,
            public: false,
            debug: false,
            rpc: RpcSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::RPC_TIMEOUT_MS,
            max_in_flight: defaults::RPC_MAX_IN_FLIGHT,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            protocol: defaults::http::PROTOCOL.to_string(),
            port: None,
            dns_suffix: None,
            timeout_ms: defaults::http::TIMEOUT_MS,
            proxy: None,
            max_redirects: None,
            keep_alive: false,
            exclude_params: defaults::http::EXCLUDE_PARAMS.iter().map(|p| p.to_string()).collect(),
            internal_request_header: defaults::http::INTERNAL_REQUEST_HEADER.to_string(),
        }
    }
}

/// Configuration combinations a peer cannot run with
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("options.host is required when options.type is HTTP")]
    MissingHost,

    #[error("options.url must not be empty")]
    MissingUrl,

    #[error("rpc.timeout_ms must be greater than 0")]
    ZeroRpcTimeout,

    #[error("rpc.max_in_flight must be greater than 0")]
    ZeroMaxInFlight,
}

impl MeshConfig {
    /// Load from `path` (if any) with `MESH_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, defaults::ENV_PREFIX)
    }

    /// Same as [`MeshConfig::load`] with a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading mesh config: {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: MeshConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.expand_env_vars()?;
        debug!(?config, "Loaded mesh config");
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml(document: &str) -> Result<Self> {
        toml::from_str(document).context("Failed to parse mesh config")
    }

    /// Expand `${VAR}` references in the broker url
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded = shellexpand::env(&self.url).context("Failed to expand broker url")?;
        self.url = expanded.into_owned();
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.kind == TransportKind::Http && self.host.is_none() {
            return Err(ValidationError::MissingHost);
        }
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        if self.rpc.timeout_ms == 0 {
            return Err(ValidationError::ZeroRpcTimeout);
        }
        if self.rpc.max_in_flight == 0 {
            return Err(ValidationError::ZeroMaxInFlight);
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }
}

impl HttpSettings {
    /// `None` when calls should never time out
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.url, "amqp://localhost:5672");
        assert_eq!(config.kind, TransportKind::Rpc);
        assert_eq!(config.exchange, "microservices-services");
        assert_eq!(config.rpc_timeout(), Duration::from_secs(5));
        assert_eq!(config.rpc.max_in_flight, 64);
        assert_eq!(config.http.timeout(), None);
        assert_eq!(config.http.exclude_params, vec!["provider", "connection", "resolve"]);
        assert_eq!(config.http.internal_request_header, "X-Internal-Request");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("mesh.toml");

        let config_content = r#"
key = "users-peer"
namespace = "shop"
url = "memory://shop"
publish = true
type = "HTTP"
host = "users.local"

[rpc]
timeout_ms = 250
max_in_flight = 8

[http]
port = 3030
dns_suffix = ".svc.cluster.local"
timeout_ms = 1500
"#;

        fs::write(&config_path, config_content).unwrap();

        let config = MeshConfig::load_with_prefix(Some(&config_path), "MESH_TEST_LOAD_FILE").unwrap();

        assert_eq!(config.key.as_deref(), Some("users-peer"));
        assert_eq!(config.namespace.as_deref(), Some("shop"));
        assert_eq!(config.url, "memory://shop");
        assert!(config.publish);
        assert!(!config.register);
        assert_eq!(config.kind, TransportKind::Http);
        assert_eq!(config.rpc.timeout_ms, 250);
        assert_eq!(config.rpc.max_in_flight, 8);
        assert_eq!(config.http.port, Some(3030));
        assert_eq!(config.http.timeout(), Some(Duration::from_millis(1500)));
        // Untouched nested defaults survive a partial table
        assert_eq!(config.http.protocol, "http");
        assert_eq!(config.exchange, "microservices-services");
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("MESHENVTEST_NAMESPACE", "from-env");
        std::env::set_var("MESHENVTEST_RPC__TIMEOUT_MS", "1200");
        std::env::set_var("MESHENVTEST_PUBLISH", "true");

        let config = MeshConfig::load_with_prefix(None, "MESHENVTEST").unwrap();

        assert_eq!(config.namespace.as_deref(), Some("from-env"));
        assert_eq!(config.rpc.timeout_ms, 1200);
        assert!(config.publish);
    }

    #[test]
    fn test_url_expansion() {
        std::env::set_var("MESH_TEST_BROKER_HOST", "rabbit.internal");
        let mut config = MeshConfig {
            url: "amqp://${MESH_TEST_BROKER_HOST}:5672".to_string(),
            ..MeshConfig::default()
        };
        config.expand_env_vars().unwrap();
        assert_eq!(config.url, "amqp://rabbit.internal:5672");
    }

    #[test]
    fn test_http_requires_host() {
        let config = MeshConfig::from_toml(r#"type = "HTTP""#).unwrap();
        assert_eq!(config.validate(), Err(ValidationError::MissingHost));

        let config = MeshConfig::from_toml("type = \"HTTP\"\nhost = \"a\"").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reply_limit_must_be_positive() {
        let config = MeshConfig::from_toml("[rpc]\nmax_in_flight = 0").unwrap();
        assert_eq!(config.validate(), Err(ValidationError::ZeroMaxInFlight));
    }
}
