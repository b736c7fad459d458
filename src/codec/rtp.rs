//! RTP packet codec (RFC 3550)
//!
//! Parses and serializes the fixed header, skips CSRC lists and header
//! extensions, strips padding, and leaves the payload as raw bytes.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// RTP protocol version
pub const RTP_VERSION: u8 = 2;

/// Fixed header length in bytes
pub const RTP_HEADER_LEN: usize = 12;

/// Parsed RTP header fields used by the intercom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

/// RTP packet with a borrowed-free payload
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Parse a datagram into header and payload.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < RTP_HEADER_LEN {
            return Err(CodecError::TooShort(data.len()));
        }

        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(CodecError::BadVersion(version));
        }

        let has_padding = data[0] & 0x20 != 0;
        let has_extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0f) as usize;

        let header = RtpHeader {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7f,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        };

        let mut offset = RTP_HEADER_LEN + csrc_count * 4;
        if data.len() < offset {
            return Err(CodecError::TooShort(data.len()));
        }

        if has_extension {
            if data.len() < offset + 4 {
                return Err(CodecError::TooShort(data.len()));
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + words * 4;
            if data.len() < offset {
                return Err(CodecError::TooShort(data.len()));
            }
        }

        let mut end = data.len();
        if has_padding {
            let pad = data[end - 1];
            if pad == 0 || end - offset < pad as usize {
                return Err(CodecError::InvalidPadding(pad));
            }
            end -= pad as usize;
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&data[offset..end]),
        })
    }

    /// Parse and require a specific payload type.
    pub fn parse_expecting(data: &[u8], payload_type: u8) -> Result<Self, CodecError> {
        let packet = Self::parse(data)?;
        if packet.header.payload_type != payload_type {
            return Err(CodecError::PayloadTypeMismatch {
                expected: payload_type,
                actual: packet.header.payload_type,
            });
        }
        Ok(packet)
    }

    /// Serialize into wire format (no CSRCs, no extension, no padding).
    pub fn serialize(&self) -> Result<Bytes, CodecError> {
        if self.header.payload_type > 0x7f {
            return Err(CodecError::InvalidPayloadType(self.header.payload_type));
        }

        let mut buf = BytesMut::with_capacity(RTP_HEADER_LEN + self.payload.len());
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8(((self.header.marker as u8) << 7) | self.header.payload_type);
        buf.put_u16(self.header.sequence);
        buf.put_u32(self.header.timestamp);
        buf.put_u32(self.header.ssrc);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Total serialized length
    pub fn wire_len(&self) -> usize {
        RTP_HEADER_LEN + self.payload.len()
    }
}
