//! Simulated playback engine
//!
//! A clock-driven stand-in for a real decoder/renderer. Position advances
//! with `tokio::time`, so paused-time tests control it exactly. Each instance
//! may run slightly fast or slow (`rate_permille`) to produce the drift the
//! clients have to correct.

use aura_common::playback::{PlaybackError, PlaybackSource};
use std::collections::HashMap;
use tokio::time::Instant;

/// Length used for library entries given without one
pub const DEFAULT_TRACK_MS: u32 = 240_000;

/// Nominal clock rate
pub const NOMINAL_RATE_PERMILLE: u32 = 1000;

/// Parse a library entry: `name` or `name=duration_ms`
pub fn parse_library_entry(entry: &str) -> (String, u32) {
    match entry.rsplit_once('=') {
        Some((name, ms)) => match ms.trim().parse() {
            Ok(duration_ms) => (name.trim().to_string(), duration_ms),
            Err(_) => (entry.trim().to_string(), DEFAULT_TRACK_MS),
        },
        None => (entry.trim().to_string(), DEFAULT_TRACK_MS),
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    library: HashMap<String, u32>,
    loaded: Option<String>,
    /// Position when the clock was last anchored
    anchor_ms: u32,
    /// Set while playing
    started_at: Option<Instant>,
    rate_permille: u32,
}

impl SimulatedPlayer {
    pub fn new<I, S>(library: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            library: library.into_iter().map(|(name, ms)| (name.into(), ms)).collect(),
            loaded: None,
            anchor_ms: 0,
            started_at: None,
            rate_permille: NOMINAL_RATE_PERMILLE,
        }
    }

    /// Run the clock at `rate_permille / 1000` of real time
    pub fn with_rate_permille(mut self, rate_permille: u32) -> Self {
        self.rate_permille = rate_permille.max(1);
        self
    }

    pub fn duration_ms(&self) -> Option<u32> {
        self.loaded
            .as_ref()
            .and_then(|track| self.library.get(track).copied())
    }

    pub fn has_track(&self, track_id: &str) -> bool {
        self.library.contains_key(track_id)
    }

    fn unclamped_position_ms(&self) -> u64 {
        match self.started_at {
            Some(started_at) => {
                let elapsed = started_at.elapsed().as_millis() as u64;
                self.anchor_ms as u64 + elapsed * self.rate_permille as u64 / 1000
            }
            None => self.anchor_ms as u64,
        }
    }

    /// Freeze the clock at the current position
    fn anchor(&mut self) {
        self.anchor_ms = self.current_position_ms();
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }
}

impl PlaybackSource for SimulatedPlayer {
    fn load(&mut self, track_id: &str) -> Result<(), PlaybackError> {
        if !self.library.contains_key(track_id) {
            return Err(PlaybackError::TrackNotFound(track_id.to_string()));
        }
        self.loaded = Some(track_id.to_string());
        self.anchor_ms = 0;
        self.started_at = None;
        Ok(())
    }

    fn start(&mut self) -> Result<(), PlaybackError> {
        let duration_ms = self.duration_ms().ok_or(PlaybackError::NothingLoaded)?;
        if self.current_position_ms() >= duration_ms {
            self.anchor_ms = 0;
            self.started_at = None;
        }
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.anchor();
        self.started_at = None;
    }

    fn seek(&mut self, position_ms: u32) {
        let limit = self.duration_ms().unwrap_or(0);
        self.anchor_ms = position_ms.min(limit);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    fn current_position_ms(&self) -> u32 {
        let limit = self.duration_ms().unwrap_or(0) as u64;
        self.unclamped_position_ms().min(limit) as u32
    }

    fn is_playing(&self) -> bool {
        match (self.started_at, self.duration_ms()) {
            (Some(_), Some(duration_ms)) => self.unclamped_position_ms() < duration_ms as u64,
            _ => false,
        }
    }

    fn loaded_track(&self) -> Option<String> {
        self.loaded.clone()
    }
}
