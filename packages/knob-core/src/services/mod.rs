//! Engine services layer.
//!
//! This module contains the services that sit between the transports
//! (bridge/) and the host: locating the bridge, the poll loop, the manifest
//! cache and input dispatch.

pub mod bridge_locator;
pub mod bridge_status;
pub mod input_dispatcher;
pub mod manifest_cache;
pub(crate) mod poll_policy;
pub mod sync_engine;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge_locator::{BridgeLocator, LocateOutcome};
pub use bridge_status::BridgeStatus;
pub use input_dispatcher::{Action, DispatchOutcome, InputDispatcher, InputEvent};
pub use manifest_cache::{CacheDelta, ManifestCache};
pub use sync_engine::{PollOutcome, RetryInfo, SyncEngine, SyncTransport};
