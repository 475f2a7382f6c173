//! Bridge discovery on the local network.
//!
//! - `broadcast` - fast-path probe to the subnet broadcast addresses
//! - `mdns` - DNS-SD browse for the bridge service
//! - `types` - errors and shared types
//!
//! [`NetworkDiscovery`] is the production [`BridgeDiscovery`](super::BridgeDiscovery).

pub mod broadcast;
pub mod mdns;
pub mod types;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::ServiceDaemon;
use parking_lot::Mutex;

pub use types::{is_virtual_interface, DiscoveryError, DiscoveryMethod, DiscoveryResult};

use super::traits::BridgeDiscovery;

/// Discovery over real sockets.
///
/// The mDNS daemon is created on first use and reused, since each daemon
/// owns a background thread.
#[derive(Default)]
pub struct NetworkDiscovery {
    daemon: Mutex<Option<Arc<ServiceDaemon>>>,
}

impl NetworkDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    fn daemon(&self) -> DiscoveryResult<Arc<ServiceDaemon>> {
        let mut slot = self.daemon.lock();
        if let Some(daemon) = slot.as_ref() {
            return Ok(Arc::clone(daemon));
        }
        let daemon = Arc::new(mdns::create_daemon()?);
        *slot = Some(Arc::clone(&daemon));
        Ok(daemon)
    }
}

impl Drop for NetworkDiscovery {
    fn drop(&mut self) {
        if let Some(daemon) = self.daemon.get_mut().take() {
            if let Err(e) = daemon.shutdown() {
                log::debug!("[Discovery] mDNS daemon shutdown failed: {:?}", e);
            }
        }
    }
}

#[async_trait]
impl BridgeDiscovery for NetworkDiscovery {
    async fn discover_broadcast(
        &self,
        bridge_port: u16,
        wait: Duration,
    ) -> DiscoveryResult<Option<IpAddr>> {
        broadcast::discover_broadcast(bridge_port, wait).await
    }

    async fn discover_mdns(&self, wait: Duration) -> DiscoveryResult<Option<String>> {
        let daemon = self.daemon()?;
        mdns::discover_mdns(&daemon, wait).await
    }
}
