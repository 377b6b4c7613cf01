//! Local playback engine abstraction
//!
//! The audio decoding/rendering engine is an external collaborator. The host
//! drives one and reads its position; each client mirrors the host onto its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a playback engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Track id could not be resolved against the local library
    #[error("Track not found in local library: {0}")]
    TrackNotFound(String),

    /// Operation needs a loaded track
    #[error("No track loaded")]
    NothingLoaded,

    /// Engine-specific failure
    #[error("Playback engine error: {0}")]
    Engine(String),
}

/// Capability surface of a local playback engine
///
/// Implementations are owned by exactly one actor, so methods take `&mut self`
/// and need not be thread-safe beyond `Send`.
pub trait PlaybackSource: Send + 'static {
    /// Resolve `track_id` in the local library and load it, paused at 0
    fn load(&mut self, track_id: &str) -> Result<(), PlaybackError>;

    /// Start or resume the loaded track
    fn start(&mut self) -> Result<(), PlaybackError>;

    fn pause(&mut self);

    fn seek(&mut self, position_ms: u32);

    fn current_position_ms(&self) -> u32;

    fn is_playing(&self) -> bool;

    fn loaded_track(&self) -> Option<String>;

    /// Snapshot used by drift correction
    fn local_state(&self) -> LocalPlayback {
        LocalPlayback {
            playing: self.is_playing(),
            position_ms: self.current_position_ms(),
            loaded_track_id: self.loaded_track(),
        }
    }
}

/// What a client engine currently has loaded and where it is
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalPlayback {
    pub playing: bool,
    pub position_ms: u32,
    pub loaded_track_id: Option<String>,
}

/// Discrete playback transitions on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Play,
    Pause,
    Seek { position_ms: u32 },
    TrackChanged { track_id: String },
    /// The engine reached the end of the track on its own
    Completed,
}

impl std::fmt::Display for PlaybackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackEvent::Play => write!(f, "play"),
            PlaybackEvent::Pause => write!(f, "pause"),
            PlaybackEvent::Seek { position_ms } => write!(f, "seek to {}ms", position_ms),
            PlaybackEvent::TrackChanged { track_id } => write!(f, "track changed to '{}'", track_id),
            PlaybackEvent::Completed => write!(f, "completed"),
        }
    }
}

/// Correction a client applies to its engine to match a received state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncAction {
    /// Load the track, seek, and set play/pause to match
    LoadAndSync {
        track_id: String,
        position_ms: u32,
        playing: bool,
    },
    SeekAndPlay { position_ms: u32 },
    /// Correct drift in place while playing
    Seek { position_ms: u32 },
    PauseAndSeek { position_ms: u32 },
    NoOp,
}

impl SyncAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, SyncAction::NoOp)
    }
}
