//! Common error types for AuraSync
//!
//! Nothing here is globally fatal. Every failure degrades to "this one
//! connection is down" (or "this one message was dropped"); the host and
//! client actors keep running.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::LinkError;
use crate::codec::DecodeError;
use crate::playback::PlaybackError;
use crate::protocol::PeerId;

/// Common result type for AuraSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the host and client roles
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Link-level connect/send/subscribe failure
    #[error("Transport failure: {0}")]
    Transport(#[from] LinkError),

    /// Peer answered discovery without the sync service/characteristic
    #[error("Protocol mismatch: {0} is not a compatible host")]
    ProtocolMismatch(PeerId),

    /// Push suppressed for an unbonded peer
    #[error("Unauthenticated peer: {0}")]
    Unauthenticated(PeerId),

    /// Received record could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Local playback engine error
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Operation not valid in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The owning actor has stopped
    #[error("Actor stopped: {0}")]
    ActorStopped(String),
}

/// Category of a failure, for callers that route on kind rather than detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportFailure,
    ProtocolMismatch,
    Unauthenticated,
    Malformed,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::TransportFailure,
            Error::ProtocolMismatch(_) => ErrorKind::ProtocolMismatch,
            Error::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Error::Decode(DecodeError::Malformed { .. }) => ErrorKind::Malformed,
            _ => ErrorKind::Other,
        }
    }
}
