//! Event types for the AuraSync observer stream
//!
//! Host and client actors publish these on a `tokio::sync::broadcast` channel.
//! Observers (a UI layer, the HTTP SSE endpoint, tests) subscribe instead of
//! reading actor state directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::ClientState;
use crate::error::ErrorKind;
use crate::playback::SyncAction;
use crate::protocol::{PeerId, PlaybackState};

/// Why the host pushed its state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushReason {
    /// Periodic refresh while playing
    Tick,
    /// Discrete play/pause/seek/track transition
    Transition,
}

/// AuraSync event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Host: a client link came up
    ClientConnected {
        peer_id: PeerId,
        timestamp: DateTime<Utc>,
    },

    /// Host: a client link went away
    ClientDisconnected {
        peer_id: PeerId,
        timestamp: DateTime<Utc>,
    },

    /// Host: a client enabled or disabled notifications
    ClientSubscriptionChanged {
        peer_id: PeerId,
        subscribed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Host: transport reported a bonding change
    BondStateChanged {
        peer_id: PeerId,
        bonded: bool,
        timestamp: DateTime<Utc>,
    },

    /// Host: state pushed to subscribed clients
    StateBroadcast {
        state: PlaybackState,
        reason: PushReason,
        recipients: usize,
        skipped_unbonded: usize,
        timestamp: DateTime<Utc>,
    },

    /// Host: a single push failed (not retried; the next tick resends)
    PushFailed {
        peer_id: PeerId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Client: connection state machine moved
    ConnectionStateChanged {
        peer_id: Option<PeerId>,
        from: ClientState,
        to: ClientState,
        timestamp: DateTime<Utc>,
    },

    /// Client: a connection attempt or live link failed
    ConnectionFailed {
        peer_id: PeerId,
        kind: ErrorKind,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Client: a state was decoded and a correction chosen
    StateReceived {
        state: PlaybackState,
        action: SyncAction,
        timestamp: DateTime<Utc>,
    },

    /// Client: a received record was discarded
    DecodeFailed {
        peer_id: Option<PeerId>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Client: host track is not in the local library
    TrackUnavailable {
        track_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::ClientConnected { .. } => "ClientConnected",
            SyncEvent::ClientDisconnected { .. } => "ClientDisconnected",
            SyncEvent::ClientSubscriptionChanged { .. } => "ClientSubscriptionChanged",
            SyncEvent::BondStateChanged { .. } => "BondStateChanged",
            SyncEvent::StateBroadcast { .. } => "StateBroadcast",
            SyncEvent::PushFailed { .. } => "PushFailed",
            SyncEvent::ConnectionStateChanged { .. } => "ConnectionStateChanged",
            SyncEvent::ConnectionFailed { .. } => "ConnectionFailed",
            SyncEvent::StateReceived { .. } => "StateReceived",
            SyncEvent::DecodeFailed { .. } => "DecodeFailed",
            SyncEvent::TrackUnavailable { .. } => "TrackUnavailable",
        }
    }
}
