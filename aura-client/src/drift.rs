//! Drift correction
//!
//! Pure decision function: given the host's state and the local engine's
//! state, choose the smallest correction that converges the client.
//!
//! Decision order:
//! 1. Different (or no) track loaded → `LoadAndSync`, whatever the flags say
//! 2. Host playing: local paused → `SeekAndPlay`; drift beyond the dead-band →
//!    `Seek`; otherwise `NoOp`
//! 3. Host paused: any local difference → `PauseAndSeek`; otherwise `NoOp`
//!
//! The dead-band absorbs notification jitter so small drift never causes an
//! audible seek.

use aura_common::playback::{LocalPlayback, SyncAction};
use aura_common::PlaybackState;

/// Default drift tolerance in milliseconds
pub const DEFAULT_DEAD_BAND_MS: u32 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftCorrector {
    dead_band_ms: u32,
}

impl DriftCorrector {
    pub fn new(dead_band_ms: u32) -> Self {
        Self { dead_band_ms }
    }

    pub fn dead_band_ms(&self) -> u32 {
        self.dead_band_ms
    }

    pub fn decide(&self, received: &PlaybackState, local: &LocalPlayback) -> SyncAction {
        if local.loaded_track_id.as_deref() != Some(received.track_id.as_str()) {
            return SyncAction::LoadAndSync {
                track_id: received.track_id.clone(),
                position_ms: received.position_ms,
                playing: received.playing,
            };
        }

        if received.playing {
            if !local.playing {
                SyncAction::SeekAndPlay {
                    position_ms: received.position_ms,
                }
            } else if drift_ms(local.position_ms, received.position_ms) > self.dead_band_ms {
                SyncAction::Seek {
                    position_ms: received.position_ms,
                }
            } else {
                SyncAction::NoOp
            }
        } else if local.playing || local.position_ms != received.position_ms {
            SyncAction::PauseAndSeek {
                position_ms: received.position_ms,
            }
        } else {
            SyncAction::NoOp
        }
    }
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_BAND_MS)
    }
}

fn drift_ms(a: u32, b: u32) -> u32 {
    a.abs_diff(b)
}
