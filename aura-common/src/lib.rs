//! # AuraSync Common Library
//!
//! Shared code for the host and client sync roles including:
//! - Playback state and the delimited wire codec
//! - GATT service/characteristic identifiers
//! - Radio link abstractions (host side and client side)
//! - Local playback engine abstraction
//! - Connection state enums
//! - Observer event types (SyncEvent)
//! - Configuration loading

pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod playback;
pub mod protocol;

pub use codec::{DecodeError, SyncCodec};
pub use error::{Error, ErrorKind, Result};
pub use protocol::{PeerId, PlaybackState, SyncMessage};
