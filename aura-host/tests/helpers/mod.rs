//! Test doubles for host broadcaster tests
//!
//! - MockHostLink: records notifications, with per-peer bonding, failure and stall injection
//! - MockPlayer: shared-state engine the test can move after handing it over

#![allow(dead_code)]

use async_trait::async_trait;
use aura_common::channel::{HostChannel, LinkError};
use aura_common::playback::{PlaybackError, PlaybackSource};
use aura_common::{PeerId, SyncMessage};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MockHostLink {
    sent: Mutex<Vec<(PeerId, String)>>,
    bonded: Mutex<HashSet<PeerId>>,
    failing: Mutex<HashSet<PeerId>>,
    /// Peers whose notify never completes
    stalled: Mutex<HashSet<PeerId>>,
    delays: Mutex<HashMap<PeerId, Duration>>,
}

impl MockHostLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bond(&self, peer: &str) {
        self.bonded.lock().unwrap().insert(PeerId::from(peer));
    }

    pub fn unbond(&self, peer: &str) {
        self.bonded.lock().unwrap().remove(&PeerId::from(peer));
    }

    pub fn fail(&self, peer: &str) {
        self.failing.lock().unwrap().insert(PeerId::from(peer));
    }

    pub fn stall(&self, peer: &str) {
        self.stalled.lock().unwrap().insert(PeerId::from(peer));
    }

    pub fn delay(&self, peer: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(PeerId::from(peer), delay);
    }

    /// Payloads delivered to `peer`, in order
    pub fn sent_to(&self, peer: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.as_str() == peer)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl HostChannel for MockHostLink {
    async fn notify(&self, peer: &PeerId, message: SyncMessage) -> Result<(), LinkError> {
        let delay = self.delays.lock().unwrap().get(peer).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let stalled = self.stalled.lock().unwrap().contains(peer);
        if stalled {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(peer) {
            return Err(LinkError::SendFailed {
                peer: peer.clone(),
                reason: "peer out of range".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((peer.clone(), message.to_string()));
        Ok(())
    }

    fn is_bonded(&self, peer: &PeerId) -> bool {
        self.bonded.lock().unwrap().contains(peer)
    }
}

#[derive(Debug, Default)]
struct PlayerInner {
    library: HashSet<String>,
    loaded: Option<String>,
    playing: bool,
    position_ms: u32,
}

/// Engine whose clock the test moves by hand
#[derive(Debug, Clone, Default)]
pub struct MockPlayer {
    inner: Arc<Mutex<PlayerInner>>,
}

impl MockPlayer {
    pub fn with_library(tracks: &[&str]) -> Self {
        let player = Self::default();
        player.inner.lock().unwrap().library = tracks.iter().map(|t| t.to_string()).collect();
        player
    }

    pub fn set_position(&self, position_ms: u32) {
        self.inner.lock().unwrap().position_ms = position_ms;
    }

    /// Simulate reaching the end of the track
    pub fn finish(&self) {
        self.inner.lock().unwrap().playing = false;
    }
}

impl PlaybackSource for MockPlayer {
    fn load(&mut self, track_id: &str) -> Result<(), PlaybackError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.library.contains(track_id) {
            return Err(PlaybackError::TrackNotFound(track_id.to_string()));
        }
        inner.loaded = Some(track_id.to_string());
        inner.playing = false;
        inner.position_ms = 0;
        Ok(())
    }

    fn start(&mut self) -> Result<(), PlaybackError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.loaded.is_none() {
            return Err(PlaybackError::NothingLoaded);
        }
        inner.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.inner.lock().unwrap().playing = false;
    }

    fn seek(&mut self, position_ms: u32) {
        self.inner.lock().unwrap().position_ms = position_ms;
    }

    fn current_position_ms(&self) -> u32 {
        self.inner.lock().unwrap().position_ms
    }

    fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().playing
    }

    fn loaded_track(&self) -> Option<String> {
        self.inner.lock().unwrap().loaded.clone()
    }
}
