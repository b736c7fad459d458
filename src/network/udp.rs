//! UDP socket construction for multicast send and receive
//!
//! Receive sockets enable address/port reuse so that the ingest listener and
//! the traffic monitor can both subscribe to the same group:port. A
//! non-multicast "group" address is bound directly, which allows unicast and
//! loopback operation.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::error::NetworkError;

/// Network interface selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interface {
    /// Interface identified by one of its IPv4 addresses
    Address(Ipv4Addr),
    /// Interface identified by name (e.g. `eth0`) and its kernel index
    Named { name: String, index: u32 },
}

/// Resolve an interface given as an IPv4 address or an interface name.
pub fn resolve_interface(iface: &str) -> Result<Interface, NetworkError> {
    let iface = iface.trim();
    if let Ok(addr) = iface.parse::<Ipv4Addr>() {
        return Ok(Interface::Address(addr));
    }
    let index = interface_index(iface)?;
    Ok(Interface::Named {
        name: iface.to_string(),
        index,
    })
}

#[cfg(target_os = "linux")]
fn interface_index(name: &str) -> Result<u32, NetworkError> {
    if name.is_empty() || name.contains('/') {
        return Err(NetworkError::InvalidInterface(name.to_string()));
    }
    std::fs::read_to_string(format!("/sys/class/net/{}/ifindex", name))
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| NetworkError::InvalidInterface(name.to_string()))
}

#[cfg(not(target_os = "linux"))]
fn interface_index(name: &str) -> Result<u32, NetworkError> {
    Err(NetworkError::InvalidInterface(format!(
        "{} (use the interface's IPv4 address on this platform)",
        name
    )))
}

fn new_udp_socket() -> Result<Socket, NetworkError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket
        .set_reuse_port(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    Ok(socket)
}

/// Create a receive socket bound to `port` and subscribed to `group`.
pub fn create_receive_socket(
    group: Ipv4Addr,
    port: u16,
    iface: Option<&str>,
    read_timeout: Duration,
) -> Result<UdpSocket, NetworkError> {
    let iface = iface.filter(|s| !s.trim().is_empty()).map(resolve_interface).transpose()?;
    let socket = new_udp_socket()?;

    let bind_ip = if group.is_multicast() { Ipv4Addr::UNSPECIFIED } else { group };
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(bind_ip, port));

    #[cfg(target_os = "linux")]
    if let Some(Interface::Named { name, .. }) = &iface {
        socket
            .bind_device(Some(name.as_bytes()))
            .map_err(|e| NetworkError::InvalidInterface(format!("{}: {}", name, e)))?;
    }

    socket
        .bind(&SockAddr::from(bind_addr))
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind_addr, e)))?;

    if group.is_multicast() {
        join_group(&socket, group, iface.as_ref())?;
    }

    socket
        .set_read_timeout(Some(read_timeout))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    Ok(socket.into())
}

fn join_group(socket: &Socket, group: Ipv4Addr, iface: Option<&Interface>) -> Result<(), NetworkError> {
    let join_err = |e: std::io::Error| NetworkError::JoinFailed {
        group: group.to_string(),
        reason: e.to_string(),
    };

    match iface {
        None => socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED).map_err(join_err),
        Some(Interface::Address(addr)) => socket.join_multicast_v4(&group, addr).map_err(join_err),
        #[cfg(target_os = "linux")]
        Some(Interface::Named { index, .. }) => socket
            .join_multicast_v4_n(&group, &socket2::InterfaceIndexOrAddress::Index(*index))
            .map_err(join_err),
        #[cfg(not(target_os = "linux"))]
        Some(Interface::Named { name, .. }) => Err(NetworkError::InvalidInterface(name.clone())),
    }
}

/// Create a send socket for multicast transmission.
pub fn create_send_socket(
    ttl: u32,
    iface: Option<&str>,
    bind_address: Option<Ipv4Addr>,
) -> Result<UdpSocket, NetworkError> {
    let iface = iface.filter(|s| !s.trim().is_empty()).map(resolve_interface).transpose()?;
    let socket = new_udp_socket()?;

    let bind_addr = SocketAddr::V4(SocketAddrV4::new(bind_address.unwrap_or(Ipv4Addr::UNSPECIFIED), 0));
    socket
        .bind(&SockAddr::from(bind_addr))
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind_addr, e)))?;

    socket
        .set_multicast_ttl_v4(ttl)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    // Local receivers on this host hear the transmitter too.
    socket
        .set_multicast_loop_v4(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    match &iface {
        Some(Interface::Address(addr)) => socket
            .set_multicast_if_v4(addr)
            .map_err(|e| NetworkError::InvalidInterface(format!("{}: {}", addr, e)))?,
        #[cfg(target_os = "linux")]
        Some(Interface::Named { name, .. }) => socket
            .bind_device(Some(name.as_bytes()))
            .map_err(|e| NetworkError::InvalidInterface(format!("{}: {}", name, e)))?,
        #[cfg(not(target_os = "linux"))]
        Some(Interface::Named { name, .. }) => return Err(NetworkError::InvalidInterface(name.clone())),
        None => {}
    }

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_address() {
        assert_eq!(
            resolve_interface("192.168.1.10").unwrap(),
            Interface::Address(Ipv4Addr::new(192, 168, 1, 10))
        );
    }

    #[test]
    fn test_resolve_unknown_name() {
        assert!(resolve_interface("no-such-iface0").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_resolve_loopback_name() {
        match resolve_interface("lo").unwrap() {
            Interface::Named { name, index } => {
                assert_eq!(name, "lo");
                assert!(index > 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unicast_receive_socket_binds_directly() {
        let socket = create_receive_socket(Ipv4Addr::LOCALHOST, 0, None, Duration::from_millis(50)).unwrap();
        let local = socket.local_addr().unwrap();
        assert_eq!(local.ip(), std::net::IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(local.port(), 0);
    }
}
