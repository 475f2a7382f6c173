//! Wire codec for the bridge protocols.
//!
//! Pure and stateless: binary fast-path frames, the JSON manifest, the zone
//! listing and control request bodies.

mod bounded;
mod control;
mod fast_path;
mod manifest;
mod zones;

use thiserror::Error;

pub use bounded::{BoundedStr, CapacityError, HashField, ZoneField};
pub use control::{check_control_response, ControlReply, ControlRequest};
pub use fast_path::{
    decode_fast_response, encode_fast_request, encode_volume_command, CommandKind, FastCommand,
    FastRequest, FastResponse, WireError, WireResult,
};
pub use manifest::{
    parse_manifest, parse_manifest_fast_only, parse_manifest_if_changed, ActionRef, CardScreen,
    Element, ElementDisplay, EncoderMap, FastState, ListItem, ListScreen, Manifest, MediaScreen,
    Nav, ProgressScreen, Screen, ScreenKind, StatusScreen, TextLine, TextStyle, TransportFlags,
};
pub use zones::{parse_zones, Zone};

/// Errors decoding a JSON document from the bridge.
///
/// Recoverable: the response is discarded and the next cycle retries.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for field '{0}'")]
    InvalidField(&'static str),
}

pub type ParseResult<T> = Result<T, ParseError>;
