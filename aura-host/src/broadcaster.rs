//! Host sync broadcaster
//!
//! Holds the authoritative [`PlaybackState`], the set of connected peers and
//! the owned playback engine. Every method runs on the host actor task; the
//! only concurrency is the per-peer push tasks kept in a `JoinSet`, so a slow
//! or dead client never delays the others.
//!
//! Push eligibility: a peer must be Subscribed **and** bonded at the moment
//! of the push. Read requests are answered regardless of bonding.

use aura_common::channel::{HostChannel, HostLinkEvent, LinkError};
use aura_common::events::{PushReason, SyncEvent};
use aura_common::playback::{PlaybackEvent, PlaybackSource};
use aura_common::protocol::SYNC_CHARACTERISTIC_UUID;
use aura_common::{Error, PeerId, PlaybackState, Result, SyncCodec, SyncMessage};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::peers::{PeerConnection, PeerSet};

/// Completion of one per-peer notify task
#[derive(Debug)]
pub struct PushOutcome {
    pub peer: PeerId,
    pub result: std::result::Result<(), LinkError>,
}

/// Observer view of the host
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    pub state: PlaybackState,
    pub peers: Vec<PeerConnection>,
}

pub struct HostSyncBroadcaster<L: HostChannel, P: PlaybackSource> {
    link: Arc<L>,
    source: P,
    state: PlaybackState,
    peers: PeerSet,
    pushes: JoinSet<PushOutcome>,
    events: broadcast::Sender<SyncEvent>,
}

impl<L: HostChannel, P: PlaybackSource> HostSyncBroadcaster<L, P> {
    pub fn new(link: Arc<L>, source: P, events: broadcast::Sender<SyncEvent>) -> Self {
        let state = read_source(&source);
        Self {
            link,
            source,
            state,
            peers: PeerSet::new(),
            pushes: JoinSet::new(),
            events,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn event_sender(&self) -> broadcast::Sender<SyncEvent> {
        self.events.clone()
    }

    pub fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            state: self.state.clone(),
            peers: self.peers.summaries(),
        }
    }

    /// Route one GATT server callback
    pub fn handle_link_event(&mut self, event: HostLinkEvent) {
        match event {
            HostLinkEvent::ClientConnected(peer) => self.on_client_connected(peer),
            HostLinkEvent::ClientDisconnected(peer) => self.on_client_disconnected(&peer),
            HostLinkEvent::ReadRequest {
                peer,
                characteristic,
                respond_to,
            } => {
                if characteristic != SYNC_CHARACTERISTIC_UUID {
                    debug!(peer = %peer, %characteristic, "Read of unknown characteristic");
                    return;
                }
                let message = self.on_read_request(&peer);
                if respond_to.send(message).is_err() {
                    debug!(peer = %peer, "Read requester went away");
                }
            }
            HostLinkEvent::SubscriptionChanged { peer, enabled } => {
                self.on_subscription_changed(&peer, enabled)
            }
            HostLinkEvent::BondStateChanged { peer, bonded } => {
                self.on_bond_changed(&peer, bonded)
            }
        }
    }

    /// A client link came up. No push is forced; the client reads or waits
    /// for the next tick.
    pub fn on_client_connected(&mut self, peer: PeerId) {
        if !self.peers.insert(peer.clone()) {
            debug!(peer = %peer, "Duplicate connect for known peer");
            return;
        }
        info!(peer = %peer, clients = self.peers.len(), "Client connected");
        self.emit(SyncEvent::ClientConnected {
            peer_id: peer,
            timestamp: Utc::now(),
        });
    }

    pub fn on_client_disconnected(&mut self, peer: &PeerId) {
        if self.peers.remove(peer).is_none() {
            debug!(peer = %peer, "Disconnect for unknown peer");
            return;
        }
        info!(peer = %peer, clients = self.peers.len(), "Client disconnected");
        self.emit(SyncEvent::ClientDisconnected {
            peer_id: peer.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Current state, encoded, with a fresh position while playing
    ///
    /// Serves a snapshot only. The authoritative state moves on ticks and
    /// playback events, which push every change they make.
    pub fn on_read_request(&self, peer: &PeerId) -> SyncMessage {
        let snapshot = if self.state.playing {
            self.refreshed()
        } else {
            self.state.clone()
        };
        debug!(peer = %peer, state = %snapshot, "Serving read request");
        SyncCodec::encode(&snapshot)
    }

    pub fn on_subscription_changed(&mut self, peer: &PeerId, enabled: bool) {
        match self.peers.set_subscribed(peer, enabled) {
            Some(state) => {
                info!(peer = %peer, %state, "Client subscription changed");
                self.emit(SyncEvent::ClientSubscriptionChanged {
                    peer_id: peer.clone(),
                    subscribed: enabled,
                    timestamp: Utc::now(),
                });
            }
            None => debug!(peer = %peer, "Subscription change for unknown peer"),
        }
    }

    pub fn on_bond_changed(&mut self, peer: &PeerId, bonded: bool) {
        if !self.peers.set_bonded(peer, bonded) {
            debug!(peer = %peer, "Bond change for unknown peer");
            return;
        }
        info!(peer = %peer, bonded, "Client bond state changed");
        self.emit(SyncEvent::BondStateChanged {
            peer_id: peer.clone(),
            bonded,
            timestamp: Utc::now(),
        });
    }

    /// Periodic refresh; pushes only while playing
    ///
    /// Returns the number of peers a push was started for.
    pub fn on_timer_tick(&mut self) -> usize {
        if !self.state.playing {
            return 0;
        }
        self.state = self.refreshed();
        if !self.state.playing {
            info!(track = %self.state.track_id, "Track completed");
        }
        self.broadcast(PushReason::Tick)
    }

    /// Apply a discrete transition to the engine, then push the new state
    ///
    /// On engine failure the state is left untouched and nothing is pushed.
    pub fn on_playback_event(&mut self, event: PlaybackEvent) -> Result<PlaybackState> {
        info!(%event, "Playback event");

        let applied = match &event {
            PlaybackEvent::Play => self.source.start(),
            PlaybackEvent::Pause => {
                self.source.pause();
                Ok(())
            }
            PlaybackEvent::Seek { position_ms } => {
                self.source.seek(*position_ms);
                Ok(())
            }
            PlaybackEvent::TrackChanged { track_id } => self
                .source
                .load(track_id)
                .and_then(|()| self.source.start()),
            PlaybackEvent::Completed => {
                if self.source.is_playing() {
                    self.source.pause();
                }
                Ok(())
            }
        };

        if let Err(e) = applied {
            warn!(%event, "Engine rejected playback event: {}", e);
            return Err(e.into());
        }

        self.state = read_source(&self.source);
        self.broadcast(PushReason::Transition);
        Ok(self.state.clone())
    }

    /// Start one notify task per eligible peer
    fn broadcast(&mut self, reason: PushReason) -> usize {
        let message = SyncCodec::encode(&self.state);
        let mut recipients = 0;
        let mut skipped_unbonded = 0;

        for connection in self.peers.subscribed_mut() {
            let bonded = self.link.is_bonded(&connection.peer_id);
            connection.bonded = bonded;
            if !bonded {
                let skipped = Error::Unauthenticated(connection.peer_id.clone());
                debug!(kind = ?skipped.kind(), "Skipping push: {}", skipped);
                skipped_unbonded += 1;
                continue;
            }

            let link = Arc::clone(&self.link);
            let peer = connection.peer_id.clone();
            let message = message.clone();
            self.pushes.spawn(async move {
                let result = link.notify(&peer, message).await;
                PushOutcome { peer, result }
            });
            recipients += 1;
        }

        debug!(
            ?reason,
            recipients,
            skipped_unbonded,
            payload = %message,
            "Broadcast state"
        );
        self.emit(SyncEvent::StateBroadcast {
            state: self.state.clone(),
            reason,
            recipients,
            skipped_unbonded,
            timestamp: Utc::now(),
        });
        recipients
    }

    pub fn has_pending_pushes(&self) -> bool {
        !self.pushes.is_empty()
    }

    /// Next finished push task; None when no push is outstanding
    pub async fn join_next_push(&mut self) -> Option<std::result::Result<PushOutcome, JoinError>> {
        self.pushes.join_next().await
    }

    /// Log and report one finished push. Failures are never retried here;
    /// the next tick carries the state again.
    pub fn record_push(&mut self, joined: std::result::Result<PushOutcome, JoinError>) {
        match joined {
            Ok(PushOutcome { peer, result: Ok(()) }) => {
                debug!(peer = %peer, "Push delivered");
            }
            Ok(PushOutcome {
                peer,
                result: Err(e),
            }) => {
                warn!(peer = %peer, "Push failed: {}", e);
                self.emit(SyncEvent::PushFailed {
                    peer_id: peer,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
            Err(e) if e.is_cancelled() => debug!("Push task cancelled"),
            Err(e) => error!("Push task panicked: {}", e),
        }
    }

    /// Wait for every outstanding push and record it
    pub async fn flush_pushes(&mut self) {
        while let Some(joined) = self.pushes.join_next().await {
            self.record_push(joined);
        }
    }

    /// Abort outstanding pushes. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if !self.pushes.is_empty() {
            debug!(pending = self.pushes.len(), "Aborting outstanding pushes");
        }
        self.pushes.abort_all();
    }

    /// Current state with position and play flag pulled from the engine
    ///
    /// Position never moves backwards on the same track; engine jitter is
    /// absorbed by keeping the larger value.
    fn refreshed(&self) -> PlaybackState {
        let playing = self.source.is_playing();
        let position_ms = self.source.current_position_ms();

        PlaybackState {
            playing,
            position_ms: if playing {
                self.state.position_ms.max(position_ms)
            } else {
                position_ms
            },
            track_id: self.state.track_id.clone(),
        }
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}

fn read_source<P: PlaybackSource>(source: &P) -> PlaybackState {
    PlaybackState::new(
        source.loaded_track().unwrap_or_default(),
        source.current_position_ms(),
        source.is_playing(),
    )
}
