//! State-change notifications of published services

use super::peer_key;
use crate::constants::SERVICE_EVENT;
use crate::envelope::{to_data, Envelope, Event};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize)]
struct ServiceEventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default)]
    host: Option<String>,
    service: String,
    path: String,
    event: String,
    #[serde(default)]
    data: Value,
}

/// `created`/`updated`/`patched`/`removed` raised by a service on a publishing peer
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEvent {
    pub id: String,
    pub key: String,
    pub host: Option<String>,
    pub service: String,
    pub path: String,
    pub event: String,
    pub data: Value,
}

impl ServiceEvent {
    pub fn create(
        id: impl Into<String>,
        key: impl Into<String>,
        host: Option<String>,
        service: impl Into<String>,
        path: impl Into<String>,
        event: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            host,
            service: service.into(),
            path: path.into(),
            event: event.into(),
            data,
        }
    }

    /// Path of the facade the event belongs to on a registering peer
    pub fn register_path(&self) -> String {
        format!("{}::{}", self.service, self.path)
    }
}

impl Event for ServiceEvent {
    const NAME: &'static str = SERVICE_EVENT;

    fn to_envelope(&self) -> Envelope {
        let data = ServiceEventData {
            key: Some(self.key.clone()),
            host: self.host.clone(),
            service: self.service.clone(),
            path: self.path.clone(),
            event: self.event.clone(),
            data: self.data.clone(),
        };
        Envelope::new(Self::NAME, &self.id, Some(self.key.clone()), to_data(&data))
    }

    fn reconstruct(envelope: &Envelope) -> Result<Self> {
        envelope.expect_name(Self::NAME)?;
        let data: ServiceEventData = envelope.payload(Self::NAME)?;
        Ok(Self {
            id: envelope.id.clone(),
            key: peer_key(envelope, data.key, Self::NAME)?,
            host: data.host,
            service: data.service,
            path: data.path,
            event: data.event,
            data: data.data,
        })
    }
}
