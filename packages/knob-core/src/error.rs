//! Centralized error types for the knob core library.
//!
//! Each concern owns its `thiserror` enum and `XxxResult` alias next to the
//! code that raises it. This module ties them together:
//! - [`ErrorCode`] gives every error a stable machine-readable code
//! - [`KnobError`] wraps them for callers that cross concerns

use thiserror::Error;

use crate::bridge::{DiscoveryError, TransportError};
use crate::context::NetworkError;
use crate::state::ConfigError;
use crate::wire::{ParseError, WireError};

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a stable snake_case code, suitable for logs and host UIs.
    fn code(&self) -> &'static str;
}

impl ErrorCode for WireError {
    fn code(&self) -> &'static str {
        match self {
            Self::BadLength { .. } => "bad_frame_length",
            Self::BadMagic(_) => "bad_magic",
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::UnknownCommand(_) => "unknown_command",
        }
    }
}

impl ErrorCode for ParseError {
    fn code(&self) -> &'static str {
        match self {
            Self::Json(_) => "malformed_json",
            Self::MissingField(_) => "missing_field",
            Self::InvalidField(_) => "invalid_field",
        }
    }
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_) => "http_error_status",
            Self::Io(_) => "socket_error",
            Self::Timeout(_) => "timeout",
            Self::Resolve(_) => "resolve_failed",
            Self::Rejected(_) => "bridge_rejected",
            Self::Wire(e) => e.code(),
            Self::Parse(e) => e.code(),
            Self::Url(e) => e.code(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoBridge => "no_bridge",
            Self::NoZone => "no_zone",
            Self::UnknownZone(_) => "unknown_zone",
            Self::Invalid(_) => "invalid_config",
            Self::Io(_) => "config_io_failed",
            Self::Serde(_) => "config_serde_failed",
        }
    }
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "socket_bind_failed",
            Self::NoInterfaces => "no_network_interfaces",
            Self::MdnsDaemon(_) => "mdns_daemon_failed",
        }
    }
}

impl ErrorCode for NetworkError {
    fn code(&self) -> &'static str {
        match self {
            Self::Detection(_) => "ip_detection_failed",
            Self::InvalidUrl(_) => "invalid_bridge_url",
        }
    }
}

/// Any failure the core can report.
///
/// Nothing here is fatal: every variant degrades to "retry on the next tick
/// with a status message".
#[derive(Debug, Error)]
pub enum KnobError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl ErrorCode for KnobError {
    fn code(&self) -> &'static str {
        match self {
            Self::Wire(e) => e.code(),
            Self::Parse(e) => e.code(),
            Self::Transport(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Discovery(e) => e.code(),
            Self::Network(e) => e.code(),
        }
    }
}

impl KnobError {
    /// Whether the engine keeps running after this error. Always true.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

pub type KnobResult<T> = Result<T, KnobError>;
