//! Peer registry
//!
//! `key -> PeerDescriptor`, written by the Hello and Welcome handlers.
//! Registration is an upsert where the last writer wins. Peers are never
//! evicted: calls to a vanished peer surface through the RPC timeout.

use codec::{HelloEvent, Presence, TransportKind, WelcomeEvent};
use dashmap::DashMap;
use tracing::debug;

/// What the mesh knows about one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDescriptor {
    pub key: String,
    pub id: String,
    pub host: String,
    pub kind: TransportKind,
    pub queue: Option<String>,
    pub registrar: bool,
    pub publisher: bool,
}

impl PeerDescriptor {
    fn from_presence(key: &str, id: &str, presence: &Presence) -> Self {
        Self {
            key: key.to_string(),
            id: id.to_string(),
            host: presence.host.clone(),
            kind: presence.kind,
            queue: presence.queue.clone(),
            registrar: presence.registrar.unwrap_or(false),
            publisher: presence.publisher.unwrap_or(false),
        }
    }
}

impl From<&HelloEvent> for PeerDescriptor {
    fn from(event: &HelloEvent) -> Self {
        Self::from_presence(&event.key, &event.id, &event.presence)
    }
}

impl From<&WelcomeEvent> for PeerDescriptor {
    fn from(event: &WelcomeEvent) -> Self {
        Self::from_presence(&event.key, &event.id, &event.presence)
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    peers: DashMap<String, PeerDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert `peer`, returning the descriptor it replaced
    pub fn register(&self, peer: PeerDescriptor) -> Option<PeerDescriptor> {
        debug!(key = %peer.key, host = %peer.host, kind = %peer.kind, "Registered peer");
        self.peers.insert(peer.key.clone(), peer)
    }

    pub fn get(&self, key: &str) -> Option<PeerDescriptor> {
        self.peers.get(key).map(|p| p.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peers(&self) -> Vec<PeerDescriptor> {
        self.peers.iter().map(|p| p.value().clone()).collect()
    }
}
