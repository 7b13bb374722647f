//! Who this peer is on the mesh

use mesh_config::MeshConfig;
use network::PeerTopology;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Process instance id
    pub id: String,
    /// Logical identity, shared by every instance of a deployment
    pub key: String,
    pub service: String,
    pub host: String,
    pub namespace: Option<String>,
}

impl Identity {
    /// id = configured or random; key = configured, else host, else random;
    /// service and host fall back to the key
    pub fn resolve(config: &MeshConfig) -> Self {
        let id = config.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = config
            .key
            .clone()
            .or_else(|| config.host.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            id,
            service: config.service.clone().unwrap_or_else(|| key.clone()),
            host: config.host.clone().unwrap_or_else(|| key.clone()),
            namespace: config.namespace.clone().filter(|ns| !ns.is_empty()),
            key,
        }
    }

    /// Broker connection name, `<host>-<id>`
    pub fn connection_name(&self) -> String {
        format!("{}-{}", self.host, self.id)
    }

    pub fn topology(&self, exchange: &str) -> PeerTopology {
        PeerTopology::new(self.namespace.as_deref(), exchange, &self.service, &self.id)
    }
}
