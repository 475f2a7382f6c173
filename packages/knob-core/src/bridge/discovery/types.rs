//! Shared types for bridge discovery.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// How a bridge address was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryMethod {
    /// UDP probe to the subnet broadcast address.
    Broadcast,
    /// DNS-SD browse.
    Mdns,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => write!(f, "UDP broadcast"),
            Self::Mdns => write!(f, "mDNS"),
        }
    }
}

/// Errors that can occur during discovery.
///
/// "Nothing answered" is not an error; discovery functions return `Ok(None)`.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to create or bind a UDP socket for the probe.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// No usable network interfaces found.
    #[error("no usable network interfaces found")]
    NoInterfaces,

    /// mDNS daemon error.
    #[error("mDNS daemon error: {0}")]
    MdnsDaemon(String),
}

/// Convenient Result alias for bridge discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Interface name prefixes that never lead to the bridge.
pub const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap",
];

/// Checks if an interface name belongs to a virtual/container interface.
pub fn is_virtual_interface(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name_lower.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_interfaces_are_skipped() {
        assert!(is_virtual_interface("docker0"));
        assert!(is_virtual_interface("VETH12ab"));
        assert!(is_virtual_interface("lo"));
        assert!(!is_virtual_interface("wlan0"));
        assert!(!is_virtual_interface("en0"));
    }
}
