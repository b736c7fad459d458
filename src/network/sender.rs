//! RTP datagram sender

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use crate::constants::MAX_PACKET_SIZE;
use crate::error::NetworkError;
use crate::network::udp::create_send_socket;

/// Sender statistics
#[derive(Debug, Clone, Default)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
}

/// Sends serialized RTP packets to one destination group:port
pub struct RtpSender {
    socket: UdpSocket,
    destination: SocketAddr,
    stats: SenderStats,
}

impl RtpSender {
    pub fn new(
        destination: SocketAddrV4,
        ttl: u32,
        iface: Option<&str>,
        bind_address: Option<Ipv4Addr>,
    ) -> Result<Self, NetworkError> {
        let socket = create_send_socket(ttl, iface, bind_address)?;
        tracing::info!(
            "RTP sender bound to {} -> {} (ttl {})",
            socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".to_string()),
            destination,
            ttl
        );
        Ok(Self {
            socket,
            destination: SocketAddr::V4(destination),
            stats: SenderStats::default(),
        })
    }

    /// Send one datagram.
    ///
    /// Failures are counted; the caller decides whether they are fatal.
    pub fn send(&mut self, datagram: &[u8]) -> Result<usize, NetworkError> {
        if datagram.len() > MAX_PACKET_SIZE {
            self.stats.send_errors += 1;
            return Err(NetworkError::PacketTooLarge(datagram.len()));
        }

        match self.socket.send_to(datagram, self.destination) {
            Ok(n) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += n as u64;
                Ok(n)
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(NetworkError::SendFailed(e.to_string()))
            }
        }
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_send_to_loopback() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut sender = RtpSender::new(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, port),
            1,
            None,
            Some(Ipv4Addr::LOCALHOST),
        )
        .unwrap();
        assert_eq!(sender.send(&[0x80; 20]).unwrap(), 20);

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(n, 20);
        assert_eq!(sender.stats().packets_sent, 1);
        assert_eq!(sender.stats().bytes_sent, 20);
    }

    #[test]
    fn test_oversized_datagram_rejected() {
        let mut sender = RtpSender::new(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9), 1, None, None).unwrap();
        let big = vec![0u8; MAX_PACKET_SIZE + 1];
        assert!(matches!(sender.send(&big), Err(NetworkError::PacketTooLarge(_))));
        assert_eq!(sender.stats().send_errors, 1);
    }
}
