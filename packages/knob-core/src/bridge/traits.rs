//! Trait abstractions for bridge transports.
//!
//! These traits enable dependency injection for testability and modularity.
//! The sync engine, locator and input dispatcher depend on traits rather than
//! on sockets and HTTP clients.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use super::client::TransportResult;
use super::discovery::DiscoveryResult;
use crate::wire::{ControlRequest, FastResponse};

/// Binary UDP fast path.
#[async_trait]
pub trait FastPath: Send + Sync {
    /// Sends a fast request and waits (briefly) for the reply.
    ///
    /// # Arguments
    /// * `base` - Bridge base URL; the fast path listens on its port + 1
    /// * `last_hash` - Cached manifest hash, empty when nothing is cached
    /// * `zone_id` - Active zone
    async fn poll_fast(
        &self,
        base: &str,
        last_hash: &str,
        zone_id: &str,
    ) -> TransportResult<FastResponse>;

    /// Fire-and-forget absolute volume command.
    ///
    /// Succeeds once the datagram is sent; nothing is awaited from the bridge.
    async fn send_volume(&self, base: &str, zone_id: &str, value: f32) -> TransportResult<()>;
}

/// JSON request/response transport.
#[async_trait]
pub trait BridgeHttp: Send + Sync {
    /// Fetches the raw manifest document for a zone.
    async fn fetch_manifest(
        &self,
        base: &str,
        zone_id: &str,
        sha: Option<&str>,
    ) -> TransportResult<Vec<u8>>;

    /// Fetches the raw zone listing.
    async fn fetch_zones(&self, base: &str, knob_id: Option<&str>) -> TransportResult<Vec<u8>>;

    /// Posts a control request. A body carrying an `"error"` key is a failure.
    async fn post_control(&self, base: &str, request: &ControlRequest) -> TransportResult<()>;
}

/// Bridge discovery on the local network.
#[async_trait]
pub trait BridgeDiscovery: Send + Sync {
    /// Broadcasts a fast-path probe and returns the first responder.
    async fn discover_broadcast(
        &self,
        bridge_port: u16,
        wait: Duration,
    ) -> DiscoveryResult<Option<IpAddr>>;

    /// Browses DNS-SD and returns a bridge base URL.
    async fn discover_mdns(&self, wait: Duration) -> DiscoveryResult<Option<String>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Combined trait for everything the poll loop and input dispatcher send.
#[async_trait]
pub trait BridgeClient: FastPath + BridgeHttp {}

/// Blanket implementation for any type implementing both traits.
impl<T: FastPath + BridgeHttp> BridgeClient for T {}
