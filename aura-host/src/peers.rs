//! Connected-peer bookkeeping for the host
//!
//! One [`PeerConnection`] per live client link. Entries are created on
//! connect and dropped on disconnect, so the set never holds a
//! `Disconnected` peer.

use aura_common::connection::HostPeerState;
use aura_common::PeerId;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerConnection {
    pub peer_id: PeerId,
    pub state: HostPeerState,
    /// Last bonding state seen from the security layer
    pub bonded: bool,
}

impl PeerConnection {
    fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            state: HostPeerState::Idle,
            bonded: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct PeerSet {
    peers: HashMap<PeerId, PeerConnection>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a newly connected peer; false if it was already present
    pub fn insert(&mut self, peer: PeerId) -> bool {
        if self.peers.contains_key(&peer) {
            return false;
        }
        let mut connection = PeerConnection::new(peer.clone());
        connection.state = HostPeerState::Connected;
        self.peers.insert(peer, connection);
        true
    }

    pub fn remove(&mut self, peer: &PeerId) -> Option<PeerConnection> {
        self.peers.remove(peer).map(|mut connection| {
            connection.state = HostPeerState::Disconnected;
            connection
        })
    }

    /// Apply a CCCD write; returns the new state, or None for an unknown peer
    pub fn set_subscribed(&mut self, peer: &PeerId, enabled: bool) -> Option<HostPeerState> {
        let connection = self.peers.get_mut(peer)?;
        connection.state = if enabled {
            HostPeerState::Subscribed
        } else {
            HostPeerState::Unsubscribed
        };
        Some(connection.state)
    }

    /// Record a bonding change; false for an unknown peer
    pub fn set_bonded(&mut self, peer: &PeerId, bonded: bool) -> bool {
        match self.peers.get_mut(peer) {
            Some(connection) => {
                connection.bonded = bonded;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerConnection> {
        self.peers.get(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers with notifications enabled
    pub fn subscribed_mut(&mut self) -> impl Iterator<Item = &mut PeerConnection> {
        self.peers
            .values_mut()
            .filter(|c| c.state.accepts_notifications())
    }

    /// Stable listing for observers, ordered by peer id
    pub fn summaries(&self) -> Vec<PeerConnection> {
        let mut list: Vec<PeerConnection> = self.peers.values().cloned().collect();
        list.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        list
    }
}
