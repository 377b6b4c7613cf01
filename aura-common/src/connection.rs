//! Connection state enums for both roles

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one client link as seen by the host
///
/// `Idle → Connected → (Subscribed ↔ Unsubscribed) → Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPeerState {
    Idle,
    Connected,
    Subscribed,
    Unsubscribed,
    Disconnected,
}

impl HostPeerState {
    /// Whether notifications are currently enabled for this peer
    pub fn accepts_notifications(&self) -> bool {
        matches!(self, HostPeerState::Subscribed)
    }
}

impl fmt::Display for HostPeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPeerState::Idle => write!(f, "idle"),
            HostPeerState::Connected => write!(f, "connected"),
            HostPeerState::Subscribed => write!(f, "subscribed"),
            HostPeerState::Unsubscribed => write!(f, "unsubscribed"),
            HostPeerState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// State of the client's single link to its host
///
/// `Disconnected → Connecting → Connected → ServicesDiscovered → Subscribed → Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ServicesDiscovered,
    Subscribed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Disconnected => write!(f, "disconnected"),
            ClientState::Connecting => write!(f, "connecting"),
            ClientState::Connected => write!(f, "connected"),
            ClientState::ServicesDiscovered => write!(f, "services_discovered"),
            ClientState::Subscribed => write!(f, "subscribed"),
        }
    }
}
