//! Service listings exchanged between peers

use super::peer_key;
use crate::constants::{ADVERTISED_EVENTS, ADVERTISED_METHODS, SERVICES_PUBLISHED_EVENT};
use crate::envelope::{to_data, Envelope, Event};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One discoverable operation surface hosted by a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub key: String,
    pub service: String,
    #[serde(default)]
    pub host: Option<String>,
    pub path: String,
    #[serde(default = "advertised_methods")]
    pub methods: Vec<String>,
    #[serde(default = "advertised_events")]
    pub events: Vec<String>,
}

fn advertised_methods() -> Vec<String> {
    ADVERTISED_METHODS.iter().map(|m| m.to_string()).collect()
}

fn advertised_events() -> Vec<String> {
    ADVERTISED_EVENTS.iter().map(|e| e.to_string()).collect()
}

impl ServiceDescriptor {
    /// Describe a local service at `path` with the advertised method and event sets
    pub fn advertise(
        path: impl Into<String>,
        key: impl Into<String>,
        service: impl Into<String>,
        host: Option<String>,
    ) -> Self {
        let path = path.into();
        Self {
            name: path.clone(),
            key: key.into(),
            service: service.into(),
            host,
            path,
            methods: advertised_methods(),
            events: advertised_events(),
        }
    }

    /// Path under which a registering peer installs the facade: `<service>::<path>`
    pub fn register_path(&self) -> String {
        format!("{}::{}", self.service, self.path)
    }

    /// Externally routable path used when remote services are public
    pub fn public_path(&self) -> String {
        format!("/{}/{}", self.service, self.path)
    }
}

#[derive(Serialize, Deserialize)]
struct ServicesData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    services: Vec<ServiceDescriptor>,
}

/// Full listing of the services a peer hosts
#[derive(Debug, Clone, PartialEq)]
pub struct ServicesPublishedEvent {
    pub id: String,
    pub key: String,
    pub host: Option<String>,
    pub services: Vec<ServiceDescriptor>,
}

impl ServicesPublishedEvent {
    pub fn create(
        id: impl Into<String>,
        key: impl Into<String>,
        host: Option<String>,
        services: Vec<ServiceDescriptor>,
    ) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            host,
            services,
        }
    }

    pub fn peer_key(&self) -> &str {
        &self.key
    }
}

impl Event for ServicesPublishedEvent {
    const NAME: &'static str = SERVICES_PUBLISHED_EVENT;

    fn to_envelope(&self) -> Envelope {
        let data = ServicesData {
            key: Some(self.key.clone()),
            host: self.host.clone(),
            services: self.services.clone(),
        };
        Envelope::new(Self::NAME, &self.id, Some(self.key.clone()), to_data(&data))
    }

    fn reconstruct(envelope: &Envelope) -> Result<Self> {
        envelope.expect_name(Self::NAME)?;
        let data: ServicesData = envelope.payload(Self::NAME)?;
        Ok(Self {
            id: envelope.id.clone(),
            key: peer_key(envelope, data.key, Self::NAME)?,
            host: data.host,
            services: data.services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_advertise_excludes_update() {
        let descriptor = ServiceDescriptor::advertise("users", "k", "accounts", None);
        assert_eq!(descriptor.methods, vec!["find", "get", "create", "patch", "remove"]);
        assert_eq!(descriptor.events, vec!["created", "updated", "patched", "removed"]);
        assert_eq!(descriptor.register_path(), "accounts::users");
        assert_eq!(descriptor.public_path(), "/accounts/users");
    }

    #[test]
    fn test_descriptor_defaults_when_lists_missing() {
        let descriptor: ServiceDescriptor =
            serde_json::from_value(json!({"name": "a", "key": "k", "service": "s", "path": "a"})).unwrap();
        assert_eq!(descriptor.methods.len(), 5);
        assert_eq!(descriptor.events.len(), 4);
        assert_eq!(descriptor.host, None);
    }
}
