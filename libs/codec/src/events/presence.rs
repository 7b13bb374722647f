//! Hello / Welcome presence events

use super::peer_key;
use crate::constants::{HELLO_EVENT, WELCOME_EVENT};
use crate::envelope::{to_data, Envelope, Event};
use crate::error::Result;
use crate::events::ServiceDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport a peer expects callers to use when reaching its services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "HTTP")]
    Http,
    #[default]
    #[serde(rename = "RPC")]
    Rpc,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "HTTP",
            TransportKind::Rpc => "RPC",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HTTP" => Ok(TransportKind::Http),
            "RPC" => Ok(TransportKind::Rpc),
            other => Err(format!("unknown transport type '{}', expected HTTP or RPC", other)),
        }
    }
}

/// What a peer says about itself when it joins or welcomes a newcomer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub host: String,
    #[serde(rename = "type", default)]
    pub kind: TransportKind,
    /// Private queue of the peer
    #[serde(rename = "queues", default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Peer installs facades for services others publish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrar: Option<bool>,
    /// Peer publishes its own local services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<bool>,
}

impl Presence {
    pub fn new(host: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            host: host.into(),
            kind,
            queue: None,
            registrar: None,
            publisher: None,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_roles(mut self, registrar: bool, publisher: bool) -> Self {
        self.registrar = Some(registrar);
        self.publisher = Some(publisher);
        self
    }
}

#[derive(Serialize, Deserialize)]
struct HelloData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(flatten)]
    presence: Presence,
}

/// Announces a newly started instance; emitted once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct HelloEvent {
    pub id: String,
    pub key: String,
    pub presence: Presence,
}

impl HelloEvent {
    pub fn create(id: impl Into<String>, key: impl Into<String>, presence: Presence) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            presence,
        }
    }

    /// Registry key of the announcing peer
    pub fn peer_key(&self) -> &str {
        &self.key
    }
}

impl Event for HelloEvent {
    const NAME: &'static str = HELLO_EVENT;

    fn to_envelope(&self) -> Envelope {
        let data = HelloData {
            key: Some(self.key.clone()),
            presence: self.presence.clone(),
        };
        Envelope::new(Self::NAME, &self.id, Some(self.key.clone()), to_data(&data))
    }

    fn reconstruct(envelope: &Envelope) -> Result<Self> {
        envelope.expect_name(Self::NAME)?;
        let data: HelloData = envelope.payload(Self::NAME)?;
        Ok(Self {
            id: envelope.id.clone(),
            key: peer_key(envelope, data.key, Self::NAME)?,
            presence: data.presence,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WelcomeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(flatten)]
    presence: Presence,
    #[serde(default)]
    services: Vec<ServiceDescriptor>,
}

/// Answer to a Hello: the running peer's own presence plus its services
#[derive(Debug, Clone, PartialEq)]
pub struct WelcomeEvent {
    pub id: String,
    pub key: String,
    pub presence: Presence,
    pub services: Vec<ServiceDescriptor>,
}

impl WelcomeEvent {
    pub fn create(
        id: impl Into<String>,
        key: impl Into<String>,
        presence: Presence,
        services: Vec<ServiceDescriptor>,
    ) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            presence,
            services,
        }
    }

    pub fn peer_key(&self) -> &str {
        &self.key
    }
}

impl Event for WelcomeEvent {
    const NAME: &'static str = WELCOME_EVENT;

    fn to_envelope(&self) -> Envelope {
        let data = WelcomeData {
            key: Some(self.key.clone()),
            presence: self.presence.clone(),
            services: self.services.clone(),
        };
        Envelope::new(Self::NAME, &self.id, Some(self.key.clone()), to_data(&data))
    }

    fn reconstruct(envelope: &Envelope) -> Result<Self> {
        envelope.expect_name(Self::NAME)?;
        let data: WelcomeData = envelope.payload(Self::NAME)?;
        Ok(Self {
            id: envelope.id.clone(),
            key: peer_key(envelope, data.key, Self::NAME)?,
            presence: data.presence,
            services: data.services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hello_wire_shape() {
        let presence = Presence::new("host-a", TransportKind::Http)
            .with_queue("ns.svc.1")
            .with_roles(true, false);
        let hello = HelloEvent::create("1", "key-a", presence);
        let json = hello.to_json();

        assert_eq!(json["name"], "HelloEvent");
        assert_eq!(json["id"], "1");
        assert_eq!(json["key"], "key-a");
        assert_eq!(json["data"]["host"], "host-a");
        assert_eq!(json["data"]["type"], "HTTP");
        assert_eq!(json["data"]["queues"], "ns.svc.1");
        assert_eq!(json["data"]["registrar"], true);
        assert_eq!(json["data"]["publisher"], false);
    }

    #[test]
    fn test_hello_rejects_welcome() {
        let welcome = WelcomeEvent::create("1", "k", Presence::new("h", TransportKind::Rpc), vec![]);
        let err = HelloEvent::reconstruct(&welcome.to_envelope()).unwrap_err();
        assert!(err.is_name_mismatch());
    }

    #[test]
    fn test_hello_minimal_payload() {
        // Older peers only send host and type
        let raw = json!({"name": "HelloEvent", "id": "id", "key": "key", "data": {"host": "h"}});
        let hello = HelloEvent::from_json(raw).unwrap();
        assert_eq!(hello.presence.kind, TransportKind::Rpc);
        assert_eq!(hello.presence.queue, None);
    }

    #[test]
    fn test_key_falls_back_to_data() {
        let raw = json!({"name": "HelloEvent", "id": "id", "data": {"key": "inner", "host": "h", "type": "RPC"}});
        let hello = HelloEvent::from_json(raw).unwrap();
        assert_eq!(hello.key, "inner");
    }

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("http".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert_eq!("RPC".parse::<TransportKind>().unwrap(), TransportKind::Rpc);
        assert!("amqp".parse::<TransportKind>().is_err());
    }
}
