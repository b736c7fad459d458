//! RTP packet codec
//!
//! Header parsing/serialization and L16 packetization. The payload is
//! uncompressed 16-bit PCM, so there is no audio codec here.

pub mod packetizer;
pub mod rtp;

pub use packetizer::{PacketizerConfig, RtpPacketizer};
pub use rtp::{RtpHeader, RtpPacket};
