//! Events posted from the engine to the UI task.
//!
//! This module provides:
//! - [`EventEmitter`] trait for engine services to emit events
//! - [`ChannelEventBridge`] for delivery over the single-consumer UI queue
//! - Event types for each UI concern (sync, status, zones, input, power)
//!
//! Every event is an owned snapshot: the UI task never reaches back into
//! engine state to render it.

mod bridge;
mod emitter;

pub use bridge::ChannelEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::services::bridge_status::BridgeStatus;
use crate::services::manifest_cache::CacheDelta;
use crate::state::DeviceState;
use crate::wire::Zone;

/// Events delivered to the UI task.
///
/// Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum UiEvent {
    Sync(SyncEvent),
    Status(StatusEvent),
    Zone(ZoneEvent),
    Input(InputFeedback),
    Power(PowerEvent),
}

/// Results of poll cycles.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// New playback state, and new screens when the content hash changed.
    Manifest { delta: CacheDelta },
    /// Whether the last poll reached the bridge.
    Online { online: bool },
    /// The device lifecycle moved.
    DeviceState { state: DeviceState },
}

/// User-visible status text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatusEvent {
    /// Sets (`Some`) or clears (`None`) the persistent network banner.
    Network { status: Option<BridgeStatus> },
    /// A transient one-line message.
    Message { text: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ZoneEvent {
    /// The label of the active zone; empty hides it.
    Name { name: String },
    /// The zone directory was rebuilt.
    Directory { zones: Vec<Zone>, selected: Option<String> },
}

/// Immediate feedback for user input, before the bridge confirms.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputFeedback {
    Volume { value: f32, step: f32 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PowerEvent {
    Charging {
        charging: bool,
        #[serde(rename = "batteryLevel")]
        battery_level: Option<u8>,
    },
}

// From implementations for converting inner events to UiEvent
impl From<SyncEvent> for UiEvent {
    fn from(event: SyncEvent) -> Self {
        Self::Sync(event)
    }
}

impl From<StatusEvent> for UiEvent {
    fn from(event: StatusEvent) -> Self {
        Self::Status(event)
    }
}

impl From<ZoneEvent> for UiEvent {
    fn from(event: ZoneEvent) -> Self {
        Self::Zone(event)
    }
}

impl From<InputFeedback> for UiEvent {
    fn from(event: InputFeedback) -> Self {
        Self::Input(event)
    }
}

impl From<PowerEvent> for UiEvent {
    fn from(event: PowerEvent) -> Self {
        Self::Power(event)
    }
}
