//! Wire codec for PlaybackState
//!
//! Record layout: `playing|position_ms|track_id` as UTF-8 text, for example
//! `true|182340|Midnight City.mp3`.
//!
//! Decoding is strict only on field count. A short record means a torn or
//! corrupted frame and is rejected; field contents are decoded permissively so
//! a partial record still yields a usable state:
//! - `playing` is true only for the exact literal `true`
//! - an unparsable position decodes as 0
//! - the track id keeps everything after the second separator

use thiserror::Error;

use crate::protocol::{PlaybackState, SyncMessage, FIELD_SEPARATOR};

const FIELD_COUNT: usize = 3;
const TRUE_LITERAL: &str = "true";
const FALSE_LITERAL: &str = "false";

/// Errors produced while decoding a received record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer fields than the record layout requires
    #[error("Malformed sync record: expected {expected} fields, found {found}")]
    Malformed { expected: usize, found: usize },
}

/// Encoder/decoder for [`PlaybackState`] records
pub struct SyncCodec;

impl SyncCodec {
    pub fn encode(state: &PlaybackState) -> SyncMessage {
        let playing = if state.playing { TRUE_LITERAL } else { FALSE_LITERAL };
        let record = format!(
            "{}{sep}{}{sep}{}",
            playing,
            state.position_ms,
            state.track_id,
            sep = FIELD_SEPARATOR
        );
        SyncMessage::from(record.into_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<PlaybackState, DecodeError> {
        let text = String::from_utf8_lossy(bytes);
        let fields: Vec<&str> = text.splitn(FIELD_COUNT, FIELD_SEPARATOR).collect();

        if fields.len() < FIELD_COUNT {
            return Err(DecodeError::Malformed {
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }

        Ok(PlaybackState {
            playing: fields[0] == TRUE_LITERAL,
            position_ms: fields[1].trim().parse().unwrap_or(0),
            track_id: fields[2].to_string(),
        })
    }
}
