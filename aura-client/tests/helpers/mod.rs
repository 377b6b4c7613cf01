//! Test doubles for client receiver tests
//!
//! - MockClientLink: scripted radio that answers the handshake on the event queue
//! - MockPlayer: in-memory engine with a fixed library

#![allow(dead_code)]

use async_trait::async_trait;
use aura_common::channel::{
    ClientChannel, ClientLinkEvent, ClientLinkEventKind, ClientLinkReceiver, ClientLinkSender,
    LinkError,
};
use aura_common::playback::{PlaybackError, PlaybackSource};
use aura_common::protocol::{ServiceDescriptor, SYNC_CHARACTERISTIC_UUID};
use aura_common::PeerId;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Calls the receiver made on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    Connect(PeerId),
    DiscoverServices,
    Subscribe(Uuid, Uuid),
    Read,
    Disconnect,
}

pub struct MockClientLink {
    events: ClientLinkSender,
    peer: Mutex<Option<PeerId>>,
    calls: Mutex<Vec<LinkCall>>,
    services: Mutex<Vec<ServiceDescriptor>>,
    connect_error: Mutex<Option<LinkError>>,
    read_value: Mutex<Option<Vec<u8>>>,
    /// Accept connect requests but never report the link as up
    silent: Mutex<bool>,
}

impl MockClientLink {
    pub fn new() -> (Self, ClientLinkReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Self {
            events: tx,
            peer: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            services: Mutex::new(vec![ServiceDescriptor::sync_service()]),
            connect_error: Mutex::new(None),
            read_value: Mutex::new(None),
            silent: Mutex::new(false),
        };
        (link, rx)
    }

    pub fn with_services(self, services: Vec<ServiceDescriptor>) -> Self {
        *self.services.lock().unwrap() = services;
        self
    }

    pub fn failing_connect(self, error: LinkError) -> Self {
        *self.connect_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_read_value(self, value: &str) -> Self {
        *self.read_value.lock().unwrap() = Some(value.as_bytes().to_vec());
        self
    }

    pub fn silent(self) -> Self {
        *self.silent.lock().unwrap() = true;
        self
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == LinkCall::Disconnect)
            .count()
    }

    /// Deliver a sync characteristic notification from `peer`
    pub fn push(&self, peer: &str, value: &str) {
        self.emit(
            PeerId::from(peer),
            ClientLinkEventKind::Notification {
                characteristic: SYNC_CHARACTERISTIC_UUID,
                value: value.as_bytes().to_vec(),
            },
        );
    }

    pub fn emit(&self, peer: PeerId, kind: ClientLinkEventKind) {
        let _ = self.events.send(ClientLinkEvent::new(peer, kind));
    }

    fn record(&self, call: LinkCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn current_peer(&self) -> Result<PeerId, LinkError> {
        self.peer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LinkError::NotConnected(PeerId::from("none")))
    }
}

#[async_trait]
impl ClientChannel for MockClientLink {
    async fn connect(&self, peer: &PeerId) -> Result<(), LinkError> {
        self.record(LinkCall::Connect(peer.clone()));
        if let Some(e) = self.connect_error.lock().unwrap().clone() {
            return Err(e);
        }
        *self.peer.lock().unwrap() = Some(peer.clone());
        if !*self.silent.lock().unwrap() {
            self.emit(peer.clone(), ClientLinkEventKind::LinkEstablished);
        }
        Ok(())
    }

    async fn discover_services(&self) -> Result<(), LinkError> {
        self.record(LinkCall::DiscoverServices);
        let peer = self.current_peer()?;
        let services = self.services.lock().unwrap().clone();
        self.emit(peer, ClientLinkEventKind::ServicesDiscovered(services));
        Ok(())
    }

    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<(), LinkError> {
        self.record(LinkCall::Subscribe(service, characteristic));
        let peer = self.current_peer()?;
        self.emit(peer, ClientLinkEventKind::SubscriptionConfirmed);
        Ok(())
    }

    async fn read(&self, _service: Uuid, _characteristic: Uuid) -> Result<Vec<u8>, LinkError> {
        self.record(LinkCall::Read);
        self.read_value
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LinkError::ReadFailed("no value".to_string()))
    }

    async fn disconnect(&self) {
        self.record(LinkCall::Disconnect);
        *self.peer.lock().unwrap() = None;
    }
}

/// In-memory engine; position only moves when told to
#[derive(Debug, Default)]
pub struct MockPlayer {
    library: HashSet<String>,
    loaded: Option<String>,
    playing: bool,
    position_ms: u32,
    pub seeks: Vec<u32>,
}

impl MockPlayer {
    pub fn with_library(tracks: &[&str]) -> Self {
        Self {
            library: tracks.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn playing_at(mut self, track: &str, position_ms: u32) -> Self {
        self.loaded = Some(track.to_string());
        self.playing = true;
        self.position_ms = position_ms;
        self
    }
}

impl PlaybackSource for MockPlayer {
    fn load(&mut self, track_id: &str) -> Result<(), PlaybackError> {
        if !self.library.contains(track_id) {
            return Err(PlaybackError::TrackNotFound(track_id.to_string()));
        }
        self.loaded = Some(track_id.to_string());
        self.playing = false;
        self.position_ms = 0;
        Ok(())
    }

    fn start(&mut self) -> Result<(), PlaybackError> {
        if self.loaded.is_none() {
            return Err(PlaybackError::NothingLoaded);
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek(&mut self, position_ms: u32) {
        self.seeks.push(position_ms);
        self.position_ms = position_ms;
    }

    fn current_position_ms(&self) -> u32 {
        self.position_ms
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn loaded_track(&self) -> Option<String> {
        self.loaded.clone()
    }
}
