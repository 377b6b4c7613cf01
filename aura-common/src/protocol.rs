//! GATT protocol contract shared by host and client
//!
//! The host exposes a single primary service with a single characteristic that
//! supports read (pull current state) and notify (push on change). Clients must
//! enable notifications through the CCCD before pushes reach them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Primary service served (and advertised) by the host
pub const SYNC_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001856_0000_1000_8000_00805f9b34fb);

/// Read + notify characteristic carrying the encoded playback state
pub const SYNC_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a3d_0000_1000_8000_00805f9b34fb);

/// Client Characteristic Configuration Descriptor
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Field separator of the wire record. Track names containing it are unsupported.
pub const FIELD_SEPARATOR: char = '|';

/// Playback state mirrored from host to clients
///
/// The host holds the authoritative copy. Clients replace their copy wholesale
/// on every decoded message; fields are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Whether the host is currently playing
    pub playing: bool,
    /// Host position within the track in milliseconds
    pub position_ms: u32,
    /// Stable track name, resolved by each client against its own library
    pub track_id: String,
}

impl PlaybackState {
    pub fn new(track_id: impl Into<String>, position_ms: u32, playing: bool) -> Self {
        Self {
            playing,
            position_ms,
            track_id: track_id.into(),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.playing { "playing" } else { "paused" };
        write!(f, "{} '{}' @ {}ms", verb, self.track_id, self.position_ms)
    }
}

/// Transport address of a remote device (e.g. a BLE MAC address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeerId {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Encoded wire form of a [`PlaybackState`]
///
/// Created fresh per transmission and immutable afterwards. Cloning shares the
/// payload, so one encoding can fan out to every client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    payload: Arc<[u8]>,
}

impl SyncMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.payload.to_vec()
    }
}

impl From<Vec<u8>> for SyncMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            payload: bytes.into(),
        }
    }
}

impl AsRef<[u8]> for SyncMessage {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Display for SyncMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.payload))
    }
}

/// A service reported by the peer during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

impl ServiceDescriptor {
    /// The service table a compatible host exposes
    pub fn sync_service() -> Self {
        Self {
            uuid: SYNC_SERVICE_UUID,
            characteristics: vec![SYNC_CHARACTERISTIC_UUID],
        }
    }

    pub fn has_characteristic(&self, characteristic: Uuid) -> bool {
        self.characteristics.contains(&characteristic)
    }
}

/// True if the discovered services include the sync service with its characteristic
pub fn exposes_sync_characteristic(services: &[ServiceDescriptor]) -> bool {
    services
        .iter()
        .any(|s| s.uuid == SYNC_SERVICE_UUID && s.has_characteristic(SYNC_CHARACTERISTIC_UUID))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_match_bluetooth_base() {
        assert_eq!(
            SYNC_SERVICE_UUID.to_string(),
            "00001856-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            SYNC_CHARACTERISTIC_UUID.to_string(),
            "00002a3d-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(CCCD_UUID.to_string(), "00002902-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn test_service_discovery_check() {
        assert!(exposes_sync_characteristic(&[ServiceDescriptor::sync_service()]));

        // Right service, wrong characteristic
        let wrong_char = ServiceDescriptor {
            uuid: SYNC_SERVICE_UUID,
            characteristics: vec![CCCD_UUID],
        };
        assert!(!exposes_sync_characteristic(&[wrong_char]));

        // Characteristic under another service does not count
        let other_service = ServiceDescriptor {
            uuid: Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb),
            characteristics: vec![SYNC_CHARACTERISTIC_UUID],
        };
        assert!(!exposes_sync_characteristic(&[other_service]));
        assert!(!exposes_sync_characteristic(&[]));
    }

    #[test]
    fn test_sync_message_shares_payload() {
        let msg = SyncMessage::from(b"true|1|a.mp3".to_vec());
        let copy = msg.clone();
        assert_eq!(msg, copy);
        assert_eq!(copy.as_bytes(), b"true|1|a.mp3");
        assert_eq!(copy.to_string(), "true|1|a.mp3");
        assert_eq!(msg.len(), 12);
    }

    #[test]
    fn test_playback_state_display() {
        let state = PlaybackState::new("Midnight City.mp3", 182340, true);
        assert_eq!(state.to_string(), "playing 'Midnight City.mp3' @ 182340ms");
    }
}
