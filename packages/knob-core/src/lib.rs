//! Knob Core - the bridge synchronization engine of the knob controller.
//!
//! A small rotary/touch controller mirrors the now-playing state of a music
//! zone served by a bridge on the local network. This crate keeps that
//! mirror current: it finds the bridge, polls it over a compact UDP fast
//! path with an HTTP/JSON fallback, caches the screen manifest by content
//! hash and turns user input into bridge commands. It is shared by firmware
//! hosts and the headless daemon.
//!
//! # Architecture
//!
//! - [`wire`]: Pure codecs for fast-path frames, manifests, zones and control bodies
//! - [`bridge`]: Transports (UDP, HTTP) and bridge discovery (broadcast, mDNS)
//! - [`services`]: Bridge locator, sync engine, manifest cache and input dispatcher
//! - [`state`]: Configuration, device lifecycle and the shared engine state
//! - [`events`]: Events posted to the single UI task
//! - [`platform`]: Config storage and power/display seams
//! - [`bootstrap`]: Composition root wiring everything together
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`EventEmitter`](events::EventEmitter): Posting UI events
//! - [`BridgeClient`](bridge::BridgeClient): Fast-path and HTTP transport
//! - [`BridgeDiscovery`](bridge::BridgeDiscovery): Finding the bridge
//! - [`ConfigStore`](platform::ConfigStore) and [`PowerMonitor`](platform::PowerMonitor): Host platform
//! - [`IpDetector`](context::IpDetector): Local IP detection
//!
//! Each trait has a default implementation suitable for the daemon.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod bridge;
pub mod context;
pub mod error;
pub mod events;
pub mod platform;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export commonly used types at the crate root
pub use context::{BridgeUrls, FixedIpDetector, IpDetector, LocalIpDetector, NetworkError};
pub use error::{ErrorCode, KnobError, KnobResult};
pub use events::{
    ChannelEventBridge, EventEmitter, InputFeedback, LoggingEventEmitter, NoopEventEmitter,
    PowerEvent, StatusEvent, SyncEvent, UiEvent, ZoneEvent,
};
pub use platform::{
    ConfigStore, JsonFileConfigStore, ManualPowerMonitor, MemoryConfigStore, PowerMonitor,
    PowerStatus,
};
pub use runtime::PollTask;
pub use state::{BridgeConfig, ConfigError, DeviceState, EngineConfig};
pub use utils::{now_millis, sanitize_bridge_base};

// Re-export transport types
pub use bridge::{
    BridgeClient, BridgeClientImpl, BridgeDiscovery, DiscoveryMethod, NetworkDiscovery,
    TransportError,
};

// Re-export service types
pub use services::{
    Action, BridgeLocator, BridgeStatus, CacheDelta, DispatchOutcome, InputDispatcher, InputEvent,
    PollOutcome, SyncEngine,
};

// Re-export wire types
pub use wire::{FastState, Manifest, Screen, ScreenKind, Zone};

// Re-export bootstrap types
pub use bootstrap::{KnobServices, KnobServicesBuilder};
