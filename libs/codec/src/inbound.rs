//! Closed set of envelope kinds a peer can receive
//!
//! Dispatch is an exhaustive `match` over [`InboundEvent`]; names this build
//! does not know fall into [`InboundEvent::Unknown`] instead of failing.

use crate::constants::*;
use crate::envelope::{Envelope, Event};
use crate::error::Result;
use crate::events::{
    HelloEvent, RpcRequestEvent, RpcResponseEvent, ServiceEvent, ServicesPublishedEvent, WelcomeEvent,
};

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Hello(HelloEvent),
    Welcome(WelcomeEvent),
    ServicesPublished(ServicesPublishedEvent),
    RpcRequest(RpcRequestEvent),
    RpcResponse(RpcResponseEvent),
    Service(ServiceEvent),
    Unknown(Envelope),
}

impl InboundEvent {
    /// Select the typed event by envelope name
    pub fn decode(envelope: Envelope) -> Result<Self> {
        Ok(match envelope.name.as_str() {
            HELLO_EVENT => Self::Hello(HelloEvent::reconstruct(&envelope)?),
            WELCOME_EVENT => Self::Welcome(WelcomeEvent::reconstruct(&envelope)?),
            SERVICES_PUBLISHED_EVENT => Self::ServicesPublished(ServicesPublishedEvent::reconstruct(&envelope)?),
            RPC_REQUEST_EVENT => Self::RpcRequest(RpcRequestEvent::reconstruct(&envelope)?),
            RPC_RESPONSE_EVENT => Self::RpcResponse(RpcResponseEvent::reconstruct(&envelope)?),
            SERVICE_EVENT => Self::Service(ServiceEvent::reconstruct(&envelope)?),
            _ => Self::Unknown(envelope),
        })
    }

    /// Parse delivery bytes straight into an event
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::decode(Envelope::from_slice(bytes)?)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Hello(_) => HELLO_EVENT,
            Self::Welcome(_) => WELCOME_EVENT,
            Self::ServicesPublished(_) => SERVICES_PUBLISHED_EVENT,
            Self::RpcRequest(_) => RPC_REQUEST_EVENT,
            Self::RpcResponse(_) => RPC_RESPONSE_EVENT,
            Self::Service(_) => SERVICE_EVENT,
            Self::Unknown(envelope) => &envelope.name,
        }
    }
}
