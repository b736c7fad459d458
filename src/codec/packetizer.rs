//! L16 RTP packetizer
//!
//! Accumulates canonical mono samples and emits one RTP packet per
//! configured packet duration. Sequence number and timestamp start at random
//! offsets and advance per packet.

use bytes::Bytes;

use crate::audio::normalize::encode_l16;
use crate::codec::rtp::{RtpHeader, RtpPacket};
use crate::constants::MAX_PACKET_SIZE;
use crate::error::CodecError;

/// Packetizer configuration
#[derive(Debug, Clone)]
pub struct PacketizerConfig {
    pub ssrc: u32,
    pub payload_type: u8,
    pub sample_rate: u32,
    /// Packet duration in milliseconds
    pub packet_ms: u32,
}

impl PacketizerConfig {
    pub fn samples_per_packet(&self) -> usize {
        (self.sample_rate as usize * self.packet_ms as usize) / 1000
    }
}

pub struct RtpPacketizer {
    config: PacketizerConfig,
    samples_per_packet: usize,
    sequence: u16,
    timestamp: u32,
    pending: Vec<i16>,
    /// Packets produced
    packets_produced: u64,
    /// Payload bytes produced
    bytes_produced: u64,
}

impl RtpPacketizer {
    pub fn new(config: PacketizerConfig) -> Result<Self, CodecError> {
        Self::with_initial_state(config, rand::random(), rand::random())
    }

    /// Create with explicit initial sequence number and timestamp.
    pub fn with_initial_state(config: PacketizerConfig, sequence: u16, timestamp: u32) -> Result<Self, CodecError> {
        if config.payload_type > 0x7f {
            return Err(CodecError::InvalidPayloadType(config.payload_type));
        }
        let samples_per_packet = config.samples_per_packet();
        if samples_per_packet == 0 || 12 + samples_per_packet * 2 > MAX_PACKET_SIZE {
            return Err(CodecError::InvalidFrameSize(samples_per_packet));
        }

        Ok(Self {
            samples_per_packet,
            sequence,
            timestamp,
            pending: Vec::with_capacity(samples_per_packet * 4),
            packets_produced: 0,
            bytes_produced: 0,
            config,
        })
    }

    /// Queue samples for packetization.
    pub fn push(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
    }

    /// Take the next full packet, serialized, if enough samples are queued.
    pub fn next_packet(&mut self) -> Option<Bytes> {
        if self.pending.len() < self.samples_per_packet {
            return None;
        }

        let payload = encode_l16(&self.pending[..self.samples_per_packet]);
        self.pending.drain(..self.samples_per_packet);

        let packet = RtpPacket::new(
            RtpHeader {
                marker: self.packets_produced == 0,
                payload_type: self.config.payload_type,
                sequence: self.sequence,
                timestamp: self.timestamp,
                ssrc: self.config.ssrc,
            },
            payload,
        );

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.samples_per_packet as u32);
        self.packets_produced += 1;
        self.bytes_produced += packet.payload.len() as u64;

        // Payload type was validated at construction.
        packet.serialize().ok()
    }

    pub fn samples_per_packet(&self) -> usize {
        self.samples_per_packet
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    pub fn config(&self) -> &PacketizerConfig {
        &self.config
    }

    pub fn stats(&self) -> PacketizerStats {
        PacketizerStats {
            packets_produced: self.packets_produced,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Packetizer statistics
#[derive(Debug, Clone)]
pub struct PacketizerStats {
    pub packets_produced: u64,
    pub bytes_produced: u64,
}
