//! # Mesh Configuration
//!
//! Settings and defaults for a mesh peer.
//!
//! ```rust
//! use mesh_config::MeshConfig;
//!
//! let config = MeshConfig::from_toml(r#"
//! namespace = "shop"
//! service = "users"
//! publish = true
//! "#).unwrap();
//! assert!(config.validate().is_ok());
//! ```

pub mod defaults;
pub mod mesh_config;

pub use mesh_config::{HttpSettings, MeshConfig, RpcSettings, ValidationError};
