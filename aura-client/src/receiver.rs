//! Client sync receiver
//!
//! Owns the single link to a host: drives the connection handshake
//! (connect → discover → subscribe), decodes incoming state while subscribed,
//! and applies drift corrections to the local engine.
//!
//! Reconnection is the caller's job. A failed or lost link always lands in
//! `Disconnected` with every per-connection resource released.

use aura_common::channel::{ClientChannel, ClientLinkEvent, ClientLinkEventKind, LinkError};
use aura_common::config::SyncConfig;
use aura_common::connection::ClientState;
use aura_common::events::SyncEvent;
use aura_common::playback::{LocalPlayback, PlaybackError, PlaybackSource, SyncAction};
use aura_common::protocol::{
    exposes_sync_characteristic, SYNC_CHARACTERISTIC_UUID, SYNC_SERVICE_UUID,
};
use aura_common::{Error, PeerId, PlaybackState, Result, SyncCodec};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::drift::DriftCorrector;
use crate::state_machine::{ClientInput, ClientStateMachine, Transition};

/// Observer view of a receiver
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub state: ClientState,
    pub peer_id: Option<PeerId>,
    pub last_received: Option<PlaybackState>,
    pub local: LocalPlayback,
}

/// Reply channel for a caller waiting on the handshake
pub type ConnectReply = oneshot::Sender<Result<()>>;

pub struct ClientSyncReceiver<L: ClientChannel, P: PlaybackSource> {
    link: Arc<L>,
    source: P,
    machine: ClientStateMachine,
    corrector: DriftCorrector,
    config: SyncConfig,
    last_received: Option<PlaybackState>,
    /// Bound on the whole handshake; None once subscribed or disconnected
    handshake_deadline: Option<Instant>,
    pending_connect: Option<ConnectReply>,
    events: broadcast::Sender<SyncEvent>,
}

impl<L: ClientChannel, P: PlaybackSource> ClientSyncReceiver<L, P> {
    pub fn new(
        link: Arc<L>,
        source: P,
        config: SyncConfig,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            link,
            source,
            machine: ClientStateMachine::new(),
            corrector: DriftCorrector::new(config.dead_band_ms),
            config,
            last_received: None,
            handshake_deadline: None,
            pending_connect: None,
            events,
        }
    }

    pub fn state(&self) -> ClientState {
        self.machine.state()
    }

    pub fn peer(&self) -> Option<&PeerId> {
        self.machine.peer()
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn last_received(&self) -> Option<&PlaybackState> {
        self.last_received.as_ref()
    }

    pub fn handshake_deadline(&self) -> Option<Instant> {
        self.handshake_deadline
    }

    pub fn event_sender(&self) -> broadcast::Sender<SyncEvent> {
        self.events.clone()
    }

    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            state: self.machine.state(),
            peer_id: self.machine.peer().cloned(),
            last_received: self.last_received.clone(),
            local: self.source.local_state(),
        }
    }

    /// Start connecting to `peer`
    ///
    /// Returns once the transport accepted the request; the handshake then
    /// continues on link events. Not retried on failure.
    pub async fn connect(&mut self, peer: PeerId) -> Result<()> {
        if self.machine.state() != ClientState::Disconnected {
            return Err(Error::InvalidState(format!(
                "cannot connect while {}",
                self.machine.state()
            )));
        }

        info!(peer = %peer, "Connecting to host");
        self.transition(ClientInput::Connect(peer.clone()));

        match self.link.connect(&peer).await {
            Ok(()) => {
                self.handshake_deadline = Some(Instant::now() + self.config.connect_timeout());
                Ok(())
            }
            Err(e) => {
                self.fail(ClientInput::Teardown, Error::Transport(e.clone()))
                    .await;
                Err(Error::Transport(e))
            }
        }
    }

    /// Register a caller to be told when the handshake completes or fails
    pub fn await_subscribed(&mut self, reply: ConnectReply) {
        match self.machine.state() {
            ClientState::Subscribed => {
                let _ = reply.send(Ok(()));
            }
            ClientState::Disconnected => {
                let _ = reply.send(Err(Error::InvalidState(
                    "no connection in progress".to_string(),
                )));
            }
            _ => self.pending_connect = Some(reply),
        }
    }

    /// Tear down the current link, if any. Safe in every state.
    pub async fn disconnect(&mut self) {
        if self.machine.state() == ClientState::Disconnected {
            return;
        }

        info!(peer = ?self.machine.peer(), "Disconnecting from host");
        self.release(ClientInput::Teardown).await;

        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Err(Error::InvalidState(
                "disconnected before subscription completed".to_string(),
            )));
        }
    }

    pub async fn on_handshake_timeout(&mut self) {
        self.handshake_deadline = None;
        match self.machine.state() {
            ClientState::Disconnected | ClientState::Subscribed => {}
            _ => {
                let timeout = self.config.connect_timeout();
                self.fail(
                    ClientInput::Teardown,
                    Error::Transport(LinkError::Timeout(timeout)),
                )
                .await;
            }
        }
    }

    /// Apply one transport callback
    pub async fn handle_link_event(&mut self, event: ClientLinkEvent) {
        if self.machine.peer() != Some(&event.peer) {
            debug!(peer = %event.peer, "Ignoring callback from inactive link");
            return;
        }

        let peer = event.peer;
        match event.kind {
            ClientLinkEventKind::LinkEstablished => {
                if self.transition(ClientInput::LinkEstablished).moved() {
                    debug!(peer = %peer, "Link established, discovering services");
                    if let Err(e) = self.link.discover_services().await {
                        self.fail(ClientInput::Teardown, e.into()).await;
                    }
                }
            }

            ClientLinkEventKind::ConnectFailed(e) => {
                if self.machine.state() == ClientState::Connecting {
                    self.fail(ClientInput::Teardown, e.into()).await;
                }
            }

            ClientLinkEventKind::ServicesDiscovered(services) => {
                if self.machine.state() != ClientState::Connected {
                    debug!(peer = %peer, state = %self.machine.state(), "Ignoring service discovery result");
                    return;
                }

                if exposes_sync_characteristic(&services) {
                    self.transition(ClientInput::ServicesFound { compatible: true });
                    if let Err(e) = self
                        .link
                        .subscribe(SYNC_SERVICE_UUID, SYNC_CHARACTERISTIC_UUID)
                        .await
                    {
                        self.fail(ClientInput::Teardown, e.into()).await;
                    }
                } else {
                    self.fail(
                        ClientInput::ServicesFound { compatible: false },
                        Error::ProtocolMismatch(peer),
                    )
                    .await;
                }
            }

            ClientLinkEventKind::SubscriptionConfirmed => {
                if self.transition(ClientInput::Subscribed).moved() {
                    self.handshake_deadline = None;
                    info!(peer = %peer, "Subscribed to host playback state");

                    if let Some(reply) = self.pending_connect.take() {
                        let _ = reply.send(Ok(()));
                    }
                    if self.config.read_on_subscribe {
                        self.read_current_state().await;
                    }
                }
            }

            ClientLinkEventKind::SubscriptionFailed(e) => {
                if self.machine.state() == ClientState::ServicesDiscovered {
                    self.fail(ClientInput::Teardown, e.into()).await;
                }
            }

            ClientLinkEventKind::Notification {
                characteristic,
                value,
            } => {
                if self.machine.state() != ClientState::Subscribed {
                    debug!(peer = %peer, "Ignoring notification before subscription");
                } else if characteristic != SYNC_CHARACTERISTIC_UUID {
                    debug!(peer = %peer, %characteristic, "Ignoring notification for foreign characteristic");
                } else {
                    self.handle_payload(&value);
                }
            }

            ClientLinkEventKind::LinkLost => {
                warn!(peer = %peer, state = %self.machine.state(), "Link to host lost");
                self.release(ClientInput::LinkLost).await;

                if let Some(reply) = self.pending_connect.take() {
                    let _ = reply.send(Err(Error::Transport(LinkError::LinkLost)));
                }
            }
        }
    }

    async fn read_current_state(&mut self) {
        match self
            .link
            .read(SYNC_SERVICE_UUID, SYNC_CHARACTERISTIC_UUID)
            .await
        {
            Ok(value) => self.handle_payload(&value),
            Err(e) => warn!("Initial state read failed, waiting for first notification: {}", e),
        }
    }

    /// Decode one record and apply the chosen correction
    ///
    /// Malformed records are dropped without touching connection state.
    fn handle_payload(&mut self, value: &[u8]) {
        let received = match SyncCodec::decode(value) {
            Ok(state) => state,
            Err(e) => {
                warn!("Discarding sync record: {}", e);
                self.emit(SyncEvent::DecodeFailed {
                    peer_id: self.machine.peer().cloned(),
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                return;
            }
        };

        let local = self.source.local_state();
        let action = self.corrector.decide(&received, &local);

        if action.is_noop() {
            debug!(state = %received, "In sync");
        } else {
            info!(state = %received, ?action, "Applying correction");
        }

        if let Err(e) = self.apply(&action) {
            match e {
                PlaybackError::TrackNotFound(track_id) => {
                    warn!(track = %track_id, "Host track not in local library, skipping");
                    self.emit(SyncEvent::TrackUnavailable {
                        track_id,
                        timestamp: Utc::now(),
                    });
                }
                other => warn!("Failed to apply {:?}: {}", action, other),
            }
        }

        self.emit(SyncEvent::StateReceived {
            state: received.clone(),
            action,
            timestamp: Utc::now(),
        });
        self.last_received = Some(received);
    }

    fn apply(&mut self, action: &SyncAction) -> std::result::Result<(), PlaybackError> {
        match action {
            SyncAction::LoadAndSync {
                track_id,
                position_ms,
                playing,
            } => {
                self.source.load(track_id)?;
                self.source.seek(*position_ms);
                if *playing {
                    self.source.start()?;
                } else {
                    self.source.pause();
                }
            }
            SyncAction::SeekAndPlay { position_ms } => {
                self.source.seek(*position_ms);
                self.source.start()?;
            }
            SyncAction::Seek { position_ms } => self.source.seek(*position_ms),
            SyncAction::PauseAndSeek { position_ms } => {
                if self.source.is_playing() {
                    self.source.pause();
                }
                self.source.seek(*position_ms);
            }
            SyncAction::NoOp => {}
        }
        Ok(())
    }

    /// Move to Disconnected and drop everything tied to the link
    async fn release(&mut self, input: ClientInput) {
        let had_link = self.machine.peer().is_some();
        self.transition(input);
        self.handshake_deadline = None;
        self.last_received = None;
        if had_link {
            self.link.disconnect().await;
        }
    }

    async fn fail(&mut self, input: ClientInput, err: Error) {
        let peer = self.machine.peer().cloned();
        warn!(peer = ?peer, kind = ?err.kind(), "Connection failed: {}", err);

        self.release(input).await;

        if let Some(peer_id) = peer {
            self.emit(SyncEvent::ConnectionFailed {
                peer_id,
                kind: err.kind(),
                reason: err.to_string(),
                timestamp: Utc::now(),
            });
        }
        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Err(err));
        }
    }

    fn transition(&mut self, input: ClientInput) -> Transition {
        let peer = match &input {
            ClientInput::Connect(peer) => Some(peer.clone()),
            _ => self.machine.peer().cloned(),
        };

        let transition = self.machine.apply(input);
        if let Transition::Moved { from, to } = transition {
            info!(peer = ?peer, "Client state {} -> {}", from, to);
            self.emit(SyncEvent::ConnectionStateChanged {
                peer_id: peer,
                from,
                to,
                timestamp: Utc::now(),
            });
        }
        transition
    }

    fn emit(&self, event: SyncEvent) {
        // No observers is fine
        let _ = self.events.send(event);
    }
}
