//! mDNS/DNS-SD bridge discovery.
//!
//! Browses for the bridge's service type and turns the first resolved
//! instance into a base URL. A `base` TXT property published by the bridge
//! wins over the resolved address, since it carries the scheme and any
//! reverse-proxy host the bridge wants clients to use.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use mdns_sd::{ResolvedService, ScopedIp, ServiceDaemon, ServiceEvent};
use tokio::time::timeout;

use super::types::{DiscoveryError, DiscoveryResult};
use crate::protocol_constants::{MDNS_SERVICE_TYPE, MDNS_TXT_BASE_KEY};
use crate::utils::sanitize_bridge_base;

/// Creates a new mDNS service daemon.
///
/// The daemon spawns a background thread; create it once and reuse it.
pub fn create_daemon() -> DiscoveryResult<ServiceDaemon> {
    ServiceDaemon::new().map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))
}

/// Browses for the bridge and returns its base URL.
///
/// Returns `Ok(None)` when nothing usable resolves within `browse_timeout`.
pub async fn discover_mdns(
    daemon: &ServiceDaemon,
    browse_timeout: Duration,
) -> DiscoveryResult<Option<String>> {
    log::debug!(
        "[mDNS] Browsing {} for {}ms",
        MDNS_SERVICE_TYPE,
        browse_timeout.as_millis()
    );

    let receiver = daemon
        .browse(MDNS_SERVICE_TYPE)
        .map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))?;

    let mut found = None;
    let start = std::time::Instant::now();
    while start.elapsed() < browse_timeout {
        let remaining = browse_timeout.saturating_sub(start.elapsed());
        match timeout(remaining, async { receiver.recv_async().await }).await {
            Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                log::trace!("[mDNS] Service resolved: {:?}", info.fullname);
                if let Some(base) = parse_bridge_service(&info) {
                    log::debug!("[mDNS] Bridge at {} ({})", base, info.fullname);
                    found = Some(base);
                    break;
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                log::debug!("[mDNS] Receiver channel closed: {:?}", e);
                break;
            }
            // Timeout - normal termination
            Err(_) => break,
        }
    }

    // Stop browsing to avoid accumulating daemon work
    if let Err(e) = daemon.stop_browse(MDNS_SERVICE_TYPE) {
        log::warn!("[mDNS] Failed to stop browse: {:?}", e);
    }

    Ok(found)
}

/// Extracts a bridge base URL from a resolved service.
fn parse_bridge_service(info: &ResolvedService) -> Option<String> {
    let txt_base = info.txt_properties.get_property_val_str(MDNS_TXT_BASE_KEY);
    let ipv4 = info
        .addresses
        .iter()
        .find_map(|addr: &ScopedIp| match addr.to_ip_addr() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        });
    bridge_base_from(txt_base, ipv4, info.port)
}

/// Picks the base URL: the TXT record if usable, else `http://ipv4:port`.
fn bridge_base_from(txt_base: Option<&str>, ipv4: Option<Ipv4Addr>, port: u16) -> Option<String> {
    if let Some(base) = txt_base.and_then(sanitize_bridge_base) {
        return Some(base);
    }
    let ip = ipv4?;
    if port == 0 {
        return None;
    }
    Some(format!("http://{}:{}", ip, port))
}
