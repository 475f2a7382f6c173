//! Binary UDP fast-path frames.
//!
//! All frames are fixed-size and little-endian. Encoding never allocates and
//! never fails: string fields are cut to their field width. Decoding accepts
//! only the exact frame length, so a datagram with trailing bytes is not a
//! frame.
//!
//! ```text
//! request  (54): magic:u16 hash:[u8;20] zone_id:[u8;32]
//! response (48): magic:u16 version:u8 flags:u8 hash:[u8;20]
//!                volume:f32 min:f32 max:f32 step:f32 seek:i32 length:u32
//! command  (40): magic:u16 cmd:u8 reserved:u8 zone_id:[u8;32] value:f32
//! ```

use thiserror::Error;

use super::bounded::{HashField, ZoneField};
use super::manifest::{FastState, TransportFlags};
use crate::protocol_constants::{
    FAST_CMD_VOLUME_SET, FAST_COMMAND_LEN, FAST_COMMAND_WITH_VALUE_LEN, FAST_HASH_FIELD_LEN,
    FAST_MAGIC, FAST_REQUEST_LEN, FAST_RESPONSE_LEN, FAST_RESPONSE_VERSION, FAST_ZONE_FIELD_LEN,
    FLAG_NEXT_OK, FLAG_PAUSE_OK, FLAG_PLAYING, FLAG_PLAY_OK, FLAG_PREV_OK,
};

/// Errors decoding a binary frame.
///
/// Always recoverable: the caller falls back to the JSON transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("bad frame length: expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },

    #[error("bad magic 0x{0:04X}")]
    BadMagic(u16),

    #[error("unsupported response version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown command code 0x{0:02X}")]
    UnknownCommand(u8),
}

pub type WireResult<T> = Result<T, WireError>;

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// A fast-path poll request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastRequest {
    pub hash: HashField,
    pub zone_id: ZoneField,
}

impl FastRequest {
    /// Builds a request, silently cutting oversized fields.
    pub fn new(last_known_hash: &str, zone_id: &str) -> Self {
        Self {
            hash: HashField::truncating(last_known_hash).0,
            zone_id: ZoneField::truncating(zone_id).0,
        }
    }

    /// The discovery probe: a request with empty hash and zone.
    pub fn probe() -> Self {
        Self::default()
    }

    pub fn encode(&self) -> [u8; FAST_REQUEST_LEN] {
        let mut buf = [0u8; FAST_REQUEST_LEN];
        buf[0..2].copy_from_slice(&FAST_MAGIC.to_le_bytes());
        self.hash.write_padded(&mut buf[2..2 + FAST_HASH_FIELD_LEN]);
        self.zone_id
            .write_padded(&mut buf[2 + FAST_HASH_FIELD_LEN..FAST_REQUEST_LEN]);
        buf
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        check_len(bytes, FAST_REQUEST_LEN)?;
        check_magic(bytes)?;
        Ok(Self {
            hash: HashField::from_padded(&bytes[2..2 + FAST_HASH_FIELD_LEN]),
            zone_id: ZoneField::from_padded(&bytes[2 + FAST_HASH_FIELD_LEN..FAST_REQUEST_LEN]),
        })
    }
}

/// Encodes a poll request for `zone_id` carrying the cached manifest hash.
pub fn encode_fast_request(last_known_hash: &str, zone_id: &str) -> [u8; FAST_REQUEST_LEN] {
    FastRequest::new(last_known_hash, zone_id).encode()
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded fast-path response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FastResponse {
    pub playing: bool,
    pub transport: TransportFlags,
    pub hash: HashField,
    pub volume: f32,
    pub volume_min: f32,
    pub volume_max: f32,
    pub volume_step: f32,
    /// Seek position in seconds, `-1` when unknown.
    pub seek_position: i32,
    /// Track length in seconds, `0` when unknown.
    pub length: u32,
}

impl FastResponse {
    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.playing {
            flags |= FLAG_PLAYING;
        }
        if self.transport.play {
            flags |= FLAG_PLAY_OK;
        }
        if self.transport.pause {
            flags |= FLAG_PAUSE_OK;
        }
        if self.transport.next {
            flags |= FLAG_NEXT_OK;
        }
        if self.transport.prev {
            flags |= FLAG_PREV_OK;
        }
        flags
    }

    pub fn encode(&self) -> [u8; FAST_RESPONSE_LEN] {
        let mut buf = [0u8; FAST_RESPONSE_LEN];
        buf[0..2].copy_from_slice(&FAST_MAGIC.to_le_bytes());
        buf[2] = FAST_RESPONSE_VERSION;
        buf[3] = self.flags();
        self.hash.write_padded(&mut buf[4..24]);
        buf[24..28].copy_from_slice(&self.volume.to_le_bytes());
        buf[28..32].copy_from_slice(&self.volume_min.to_le_bytes());
        buf[32..36].copy_from_slice(&self.volume_max.to_le_bytes());
        buf[36..40].copy_from_slice(&self.volume_step.to_le_bytes());
        buf[40..44].copy_from_slice(&self.seek_position.to_le_bytes());
        buf[44..48].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Converts into the playback snapshot for `zone_id`.
    pub fn to_fast_state(&self, zone_id: &str) -> FastState {
        FastState {
            zone_id: zone_id.to_string(),
            is_playing: self.playing,
            volume: self.volume,
            volume_min: self.volume_min,
            volume_max: self.volume_max,
            volume_step: self.volume_step,
            volume_type: String::new(),
            seek_position: self.seek_position,
            length: self.length as i64,
            transport: self.transport,
        }
        .normalized()
    }
}

/// Decodes a fast-path response.
pub fn decode_fast_response(bytes: &[u8]) -> WireResult<FastResponse> {
    check_len(bytes, FAST_RESPONSE_LEN)?;
    check_magic(bytes)?;
    if bytes[2] != FAST_RESPONSE_VERSION {
        return Err(WireError::UnsupportedVersion(bytes[2]));
    }
    let flags = bytes[3];
    Ok(FastResponse {
        playing: flags & FLAG_PLAYING != 0,
        transport: TransportFlags {
            play: flags & FLAG_PLAY_OK != 0,
            pause: flags & FLAG_PAUSE_OK != 0,
            next: flags & FLAG_NEXT_OK != 0,
            prev: flags & FLAG_PREV_OK != 0,
        },
        hash: HashField::from_padded(&bytes[4..24]),
        volume: f32::from_le_bytes(le4(bytes, 24)),
        volume_min: f32::from_le_bytes(le4(bytes, 28)),
        volume_max: f32::from_le_bytes(le4(bytes, 32)),
        volume_step: f32::from_le_bytes(le4(bytes, 36)),
        seek_position: i32::from_le_bytes(le4(bytes, 40)),
        length: u32::from_le_bytes(le4(bytes, 44)),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Fire-and-forget commands understood by the fast path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandKind {
    /// Absolute volume in bridge units.
    VolumeSet(f32),
}

impl CommandKind {
    fn code(self) -> u8 {
        match self {
            Self::VolumeSet(_) => FAST_CMD_VOLUME_SET,
        }
    }
}

/// A fast-path command addressed to one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct FastCommand {
    pub zone_id: ZoneField,
    pub kind: CommandKind,
}

impl FastCommand {
    pub fn volume_set(zone_id: &str, value: f32) -> Self {
        Self {
            zone_id: ZoneField::truncating(zone_id).0,
            kind: CommandKind::VolumeSet(value),
        }
    }

    pub fn encode(&self) -> [u8; FAST_COMMAND_WITH_VALUE_LEN] {
        let value = match self.kind {
            CommandKind::VolumeSet(v) => v,
        };
        let mut buf = [0u8; FAST_COMMAND_WITH_VALUE_LEN];
        buf[0..2].copy_from_slice(&FAST_MAGIC.to_le_bytes());
        buf[2] = self.kind.code();
        buf[3] = 0;
        self.zone_id
            .write_padded(&mut buf[4..4 + FAST_ZONE_FIELD_LEN]);
        buf[FAST_COMMAND_LEN..].copy_from_slice(&value.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        if bytes.len() < FAST_COMMAND_LEN {
            return Err(WireError::BadLength {
                expected: FAST_COMMAND_LEN,
                actual: bytes.len(),
            });
        }
        check_magic(bytes)?;
        let zone_id = ZoneField::from_padded(&bytes[4..4 + FAST_ZONE_FIELD_LEN]);
        let kind = match bytes[2] {
            FAST_CMD_VOLUME_SET => {
                check_len(bytes, FAST_COMMAND_WITH_VALUE_LEN)?;
                CommandKind::VolumeSet(f32::from_le_bytes(le4(bytes, FAST_COMMAND_LEN)))
            }
            other => return Err(WireError::UnknownCommand(other)),
        };
        Ok(Self { zone_id, kind })
    }
}

/// Encodes the absolute volume command for `zone_id`.
pub fn encode_volume_command(zone_id: &str, value: f32) -> [u8; FAST_COMMAND_WITH_VALUE_LEN] {
    FastCommand::volume_set(zone_id, value).encode()
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn check_len(bytes: &[u8], expected: usize) -> WireResult<()> {
    if bytes.len() != expected {
        return Err(WireError::BadLength {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn check_magic(bytes: &[u8]) -> WireResult<()> {
    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    if magic != FAST_MAGIC {
        return Err(WireError::BadMagic(magic));
    }
    Ok(())
}

fn le4(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}
