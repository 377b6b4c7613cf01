//! Radio link abstractions
//!
//! The BLE stack is an external collaborator. Each role sees it as a command
//! trait (requests its actor issues) plus an event enum (callbacks the stack
//! delivers). Stacks must not mutate sync state from their callbacks; they
//! forward events onto the owning actor's queue, which serializes every state
//! transition.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::protocol::{PeerId, ServiceDescriptor, SyncMessage};

/// Link-level failures reported by the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Peer not connected: {0}")]
    NotConnected(PeerId),

    #[error("Service discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("Notification to {peer} failed: {reason}")]
    SendFailed { peer: PeerId, reason: String },

    #[error("Characteristic read failed: {0}")]
    ReadFailed(String),

    #[error("Link lost")]
    LinkLost,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Host side of the link: the GATT server
#[async_trait]
pub trait HostChannel: Send + Sync + 'static {
    /// Push a characteristic-changed notification to one peer
    ///
    /// Must not block on other peers; the broadcaster calls this concurrently
    /// for every eligible peer.
    async fn notify(&self, peer: &PeerId, message: SyncMessage) -> Result<(), LinkError>;

    /// Bonding/authentication state as reported by the security layer
    fn is_bonded(&self, peer: &PeerId) -> bool;
}

/// Callbacks delivered by the GATT server
#[derive(Debug)]
pub enum HostLinkEvent {
    ClientConnected(PeerId),
    ClientDisconnected(PeerId),
    /// Read of a characteristic; the actor answers on `respond_to`
    ReadRequest {
        peer: PeerId,
        characteristic: Uuid,
        respond_to: oneshot::Sender<SyncMessage>,
    },
    /// CCCD write enabling or disabling notifications
    SubscriptionChanged { peer: PeerId, enabled: bool },
    BondStateChanged { peer: PeerId, bonded: bool },
}

pub type HostLinkSender = mpsc::UnboundedSender<HostLinkEvent>;
pub type HostLinkReceiver = mpsc::UnboundedReceiver<HostLinkEvent>;

/// Client side of the link: the GATT client for a single host
///
/// Requests return once issued; their completion arrives later as a
/// [`ClientLinkEvent`]. Implementations bound every wait (connect attempts
/// included) and report failure instead of hanging.
#[async_trait]
pub trait ClientChannel: Send + Sync + 'static {
    async fn connect(&self, peer: &PeerId) -> Result<(), LinkError>;

    async fn discover_services(&self) -> Result<(), LinkError>;

    /// Enable notification delivery for a characteristic (CCCD write)
    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<(), LinkError>;

    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, LinkError>;

    /// Close the link and release transport resources
    ///
    /// Idempotent. Does not report `LinkLost` back for a locally initiated close.
    async fn disconnect(&self);
}

/// Callback delivered by the GATT client, tagged with the remote peer
///
/// The tag lets the receiver drop callbacks from a link it already tore down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLinkEvent {
    pub peer: PeerId,
    pub kind: ClientLinkEventKind,
}

impl ClientLinkEvent {
    pub fn new(peer: PeerId, kind: ClientLinkEventKind) -> Self {
        Self { peer, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLinkEventKind {
    LinkEstablished,
    ConnectFailed(LinkError),
    ServicesDiscovered(Vec<ServiceDescriptor>),
    SubscriptionConfirmed,
    SubscriptionFailed(LinkError),
    Notification { characteristic: Uuid, value: Vec<u8> },
    LinkLost,
}

pub type ClientLinkSender = mpsc::UnboundedSender<ClientLinkEvent>;
pub type ClientLinkReceiver = mpsc::UnboundedReceiver<ClientLinkEvent>;
