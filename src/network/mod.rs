//! Network subsystem for RTP multicast transport

pub mod monitor;
pub mod receiver;
pub mod sender;
pub mod udp;

pub use monitor::{TrafficMonitor, TrafficWindow};
pub use receiver::IngestListener;
pub use sender::RtpSender;
pub use udp::{create_receive_socket, create_send_socket};
