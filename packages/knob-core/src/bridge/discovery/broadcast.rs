//! UDP broadcast discovery.
//!
//! The probe is an ordinary fast-path request with an empty hash and zone.
//! Any bridge on the subnet answers it like a normal poll, and the source
//! address of the first well-formed reply is taken as the bridge's address.
//!
//! Two targets are used for every interface:
//! - Directed broadcast, computed for an assumed /24 (e.g. 192.168.1.255)
//! - Limited broadcast (255.255.255.255), which reaches the local segment
//!   whatever its real prefix
//!
//! `local-ip-address` reports addresses without their netmask, so the
//! directed target is a guess. On a wider subnet it still lands inside the
//! segment; on a narrower one routers drop it and the limited broadcast
//! carries the probe alone.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use local_ip_address::list_afinet_netifas;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::types::{is_virtual_interface, DiscoveryError, DiscoveryResult};
use crate::protocol_constants::{FAST_PORT_OFFSET, FAST_RESPONSE_LEN};
use crate::wire::{decode_fast_response, FastRequest};

/// Prefix length assumed for the directed broadcast.
pub const ASSUMED_PREFIX_LEN: u8 = 24;

/// Directed broadcast address of the `prefix_len` subnet containing `ip`.
///
/// Prefixes longer than 32 are treated as /32.
pub fn directed_broadcast(ip: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let host_bits = 32 - u32::from(prefix_len.min(32));
    let host_mask = if host_bits == 0 {
        0
    } else {
        u32::MAX >> (32 - host_bits)
    };
    Ipv4Addr::from(u32::from(ip) | host_mask)
}

/// Network interface information for discovery.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// Interface name (e.g., "en0", "wlan0").
    pub name: String,
    /// IPv4 address bound to this interface.
    pub ip: Ipv4Addr,
    /// Broadcast address for this interface (if available).
    pub broadcast: Option<Ipv4Addr>,
}

/// Gets all usable network interfaces for discovery.
///
/// Filters out virtual/container interfaces, loopback and link-local
/// addresses.
pub fn get_interfaces() -> Vec<InterfaceInfo> {
    list_afinet_netifas()
        .unwrap_or_else(|e| {
            log::warn!("[Broadcast] Failed to list network interfaces: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter_map(|(name, addr)| {
            if is_virtual_interface(&name) {
                return None;
            }
            match addr {
                IpAddr::V4(ipv4) if !ipv4.is_loopback() && !ipv4.is_link_local() => {
                    Some(InterfaceInfo {
                        name,
                        ip: ipv4,
                        broadcast: Some(directed_broadcast(ipv4, ASSUMED_PREFIX_LEN)),
                    })
                }
                _ => None,
            }
        })
        .collect()
}

/// Probe destinations for one interface: directed broadcast, then limited.
pub fn broadcast_targets(iface: &InterfaceInfo, bridge_port: u16) -> Vec<SocketAddrV4> {
    let port = bridge_port.saturating_add(FAST_PORT_OFFSET);
    let mut targets = Vec::with_capacity(2);
    if let Some(broadcast) = iface.broadcast {
        targets.push(SocketAddrV4::new(broadcast, port));
    }
    targets.push(SocketAddrV4::new(Ipv4Addr::BROADCAST, port));
    targets
}

/// Creates a broadcast-enabled UDP socket bound to an interface address.
fn create_socket(iface_ip: Ipv4Addr) -> DiscoveryResult<UdpSocket> {
    let bind_addr = SocketAddr::new(IpAddr::V4(iface_ip), 0);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[Broadcast] Failed to set SO_REUSEADDR on {}: {}", iface_ip, e);
    }
    if let Err(e) = socket.set_broadcast(true) {
        log::warn!("[Broadcast] Failed to set SO_BROADCAST on {}: {}", iface_ip, e);
    }

    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;
    socket
        .bind(&bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)
}

/// Returns the sender's address if `datagram` is a well-formed fast-path reply.
pub(crate) fn bridge_reply_source(datagram: &[u8], src: SocketAddr) -> Option<IpAddr> {
    decode_fast_response(datagram).ok().map(|_| src.ip())
}

/// Reads from `socket` until a valid bridge reply arrives.
///
/// Returns `None` when the socket fails; stray datagrams are ignored.
pub(crate) async fn wait_for_reply(socket: &UdpSocket, label: &str) -> Option<IpAddr> {
    // One spare byte so oversized datagrams are not mistaken for replies.
    let mut buf = [0u8; FAST_RESPONSE_LEN + 1];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                if let Some(ip) = bridge_reply_source(&buf[..len], src) {
                    log::debug!("[Broadcast] Reply from {} via {}", ip, label);
                    return Some(ip);
                }
                log::trace!(
                    "[Broadcast] Ignoring {}-byte datagram from {} on {}",
                    len,
                    src,
                    label
                );
            }
            Err(e) => {
                log::warn!("[Broadcast] Socket recv error on {}: {}", label, e);
                return None;
            }
        }
    }
}

/// Broadcasts a discovery probe on every usable interface.
///
/// Returns the address of the first bridge that replies within `wait`.
pub async fn discover_broadcast(bridge_port: u16, wait: Duration) -> DiscoveryResult<Option<IpAddr>> {
    let interfaces = get_interfaces();
    if interfaces.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    let mut sockets: Vec<(InterfaceInfo, UdpSocket)> = Vec::new();
    for iface in interfaces {
        match create_socket(iface.ip) {
            Ok(socket) => sockets.push((iface, socket)),
            Err(e) => {
                log::warn!(
                    "[Broadcast] Failed to create socket for {} ({}): {}",
                    iface.name,
                    iface.ip,
                    e
                );
            }
        }
    }
    if sockets.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    let probe = FastRequest::probe().encode();
    for (iface, socket) in &sockets {
        for target in broadcast_targets(iface, bridge_port) {
            if let Err(e) = socket.send_to(&probe, target).await {
                log::warn!(
                    "[Broadcast] Failed to send probe on {} to {}: {}",
                    iface.name,
                    target,
                    e
                );
            }
        }
    }

    log::debug!(
        "[Broadcast] Probed {} interface(s), waiting {}ms",
        sockets.len(),
        wait.as_millis()
    );

    let mut pending: FuturesUnordered<_> = sockets
        .iter()
        .map(|(iface, socket)| wait_for_reply(socket, &iface.name))
        .collect();

    let first = async {
        while let Some(found) = pending.next().await {
            if found.is_some() {
                return found;
            }
        }
        None
    };

    Ok(timeout(wait, first).await.unwrap_or(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FastResponse;

    fn iface(ip: [u8; 4]) -> InterfaceInfo {
        let ip = Ipv4Addr::from(ip);
        InterfaceInfo {
            name: "wlan0".into(),
            ip,
            broadcast: Some(directed_broadcast(ip, ASSUMED_PREFIX_LEN)),
        }
    }

    #[test]
    fn directed_broadcast_follows_prefix() {
        let ip = Ipv4Addr::new(10, 1, 6, 17);
        assert_eq!(directed_broadcast(ip, 24), Ipv4Addr::new(10, 1, 6, 255));
        assert_eq!(directed_broadcast(ip, 22), Ipv4Addr::new(10, 1, 7, 255));
        assert_eq!(directed_broadcast(ip, 16), Ipv4Addr::new(10, 1, 255, 255));
        assert_eq!(directed_broadcast(ip, 32), ip);
        assert_eq!(directed_broadcast(ip, 40), ip);
        assert_eq!(directed_broadcast(ip, 0), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn interface_without_broadcast_uses_limited_only() {
        let mut info = iface([172, 16, 0, 9]);
        info.broadcast = None;
        assert_eq!(
            broadcast_targets(&info, 8088),
            vec!["255.255.255.255:8089".parse::<SocketAddrV4>().unwrap()]
        );
    }

    #[test]
    fn targets_use_fast_path_port() {
        let targets = broadcast_targets(&iface([192, 168, 4, 17]), 8088);
        assert_eq!(
            targets,
            vec![
                "192.168.4.255:8089".parse::<SocketAddrV4>().unwrap(),
                "255.255.255.255:8089".parse::<SocketAddrV4>().unwrap(),
            ]
        );
    }

    #[test]
    fn only_well_formed_replies_identify_the_bridge() {
        let src: SocketAddr = "192.168.4.2:8089".parse().unwrap();
        let reply = FastResponse::default().encode();
        assert_eq!(
            bridge_reply_source(&reply, src),
            Some("192.168.4.2".parse().unwrap())
        );
        assert_eq!(bridge_reply_source(b"hello", src), None);
        // our own probe echoed back is not a reply
        assert_eq!(bridge_reply_source(&FastRequest::probe().encode(), src), None);
    }

    #[tokio::test]
    async fn wait_for_reply_skips_noise() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap();
        let bridge = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        bridge.send_to(b"noise", target).await.unwrap();
        bridge
            .send_to(&FastResponse::default().encode(), target)
            .await
            .unwrap();

        let found = timeout(Duration::from_secs(2), wait_for_reply(&listener, "lo"))
            .await
            .unwrap();
        assert_eq!(found, Some("127.0.0.1".parse().unwrap()));
    }
}
