//! # AuraSync Client
//!
//! Follower role: connects to a host over the sync characteristic, decodes
//! each pushed state and converges the local playback engine through the
//! drift corrector.

pub mod actor;
pub mod drift;
pub mod receiver;
pub mod state_machine;

pub use actor::{spawn_client, ClientHandle};
pub use drift::{DriftCorrector, DEFAULT_DEAD_BAND_MS};
pub use receiver::{ClientStatus, ClientSyncReceiver};
pub use state_machine::{ClientInput, ClientStateMachine, Transition};
