//! # AuraSync Host
//!
//! Broadcaster role: owns the authoritative playback state, tracks every
//! connected client link, and pushes the encoded state to subscribed, bonded
//! clients on each transition and on a periodic tick while playing.

pub mod actor;
pub mod broadcaster;
pub mod peers;

pub use actor::{spawn_host, HostHandle};
pub use broadcaster::{HostSnapshot, HostSyncBroadcaster, PushOutcome};
pub use peers::{PeerConnection, PeerSet};
