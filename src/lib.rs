//! # Party-line Intercom
//!
//! Every unit transmits mono L16 audio as RTP to one shared multicast group and
//! simultaneously receives and mixes every other unit's audio.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── TRANSMIT ─────────────────────────────────┐
//! │  ┌──────────────┐    ┌────────────┐    ┌──────────────┐    ┌───────────┐  │
//! │  │ Tone / cpal  │───▶│ Normalizer │───▶│ RTP L16      │───▶│ UDP send  │  │
//! │  │ capture      │    │ (48k mono) │    │ packetizer   │    │ multicast │  │
//! │  └──────────────┘    └────────────┘    └──────────────┘    └─────┬─────┘  │
//! │   (hw → dsnoop fallback)                                          │        │
//! └───────────────────────────────────────────────────────────────────┼────────┘
//!                                 group:port shared by all talkers    │
//! ┌───────────────────────────────── RECEIVE ─────────────────────────┼────────┐
//! │  ┌──────────────────────────────────────────────────────────────┐ ▼        │
//! │  │ Ingest Listener (network::receiver) - one socket, demux SSRC  │◀─       │
//! │  └──────────────────────────────────────────────────────────────┘          │
//! │       │ SSRC A            │ SSRC B            │ SSRC C                      │
//! │       ▼                   ▼                   ▼                             │
//! │  ┌─────────┐         ┌─────────┐         ┌─────────┐                        │
//! │  │ Jitter  │         │ Jitter  │         │ Jitter  │   session::Session     │
//! │  │ Buffer  │         │ Buffer  │         │ Buffer  │                        │
//! │  ├─────────┤         ├─────────┤         ├─────────┤                        │
//! │  │Normalize│         │Normalize│         │Normalize│                        │
//! │  ├─────────┤         ├─────────┤         ├─────────┤                        │
//! │  │  Level  │         │  Level  │         │  Level  │                        │
//! │  └────┬────┘         └────┬────┘         └────┬────┘                        │
//! │       └───────────────────┼───────────────────┘                             │
//! │                           ▼                                                 │
//! │              ┌─────────────────────────┐                                    │
//! │              │ Mixer (saturating sum)  │  paced every 10 ms                 │
//! │              ├─────────────────────────┤                                    │
//! │              │ Level (mix)             │                                    │
//! │              └────────────┬────────────┘                                    │
//! │                           ▼                                                 │
//! │              ┌─────────────────────────┐                                    │
//! │              │ Sink: live / WAV / null │                                    │
//! │              └─────────────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod intercom;
pub mod network;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod transmit;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Canonical sample rate for mixing and transmission
    pub const CANONICAL_SAMPLE_RATE: u32 = 48000;

    /// Mix frame period in milliseconds
    pub const MIX_FRAME_MS: u32 = 10;

    /// Samples per mix frame at the canonical rate
    pub const MIX_FRAME_SAMPLES: usize = (CANONICAL_SAMPLE_RATE / 1000 * MIX_FRAME_MS) as usize;

    /// Dynamic payload type carrying L16 mono
    pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

    /// Default multicast group shared by all units
    pub const DEFAULT_GROUP: &str = "239.69.69.69";

    /// Default UDP port
    pub const DEFAULT_PORT: u16 = 5004;

    /// Default multicast TTL for transmit
    pub const DEFAULT_TTL: u32 = 16;

    /// Default transmit packet duration in milliseconds
    pub const DEFAULT_PACKET_MS: u32 = 4;

    /// Default transmit SSRC
    pub const DEFAULT_SSRC: u32 = 12_345_678;

    /// Default tone frequency in Hz
    pub const DEFAULT_TONE_HZ: u32 = 1000;

    /// Default jitter buffer target latency in milliseconds
    pub const DEFAULT_JITTER_LATENCY_MS: u32 = 50;

    /// Default level meter publish interval in milliseconds
    pub const DEFAULT_METER_INTERVAL_MS: u32 = 100;

    /// Default peak hold time in milliseconds
    pub const DEFAULT_PEAK_TTL_MS: u32 = 500;

    /// Default HTTP port for the control API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Receive timeout for every blocking socket loop
    pub const RECV_TIMEOUT: Duration = Duration::from_millis(200);

    /// Receive buffer size (larger than any sane RTP datagram)
    pub const RECV_BUFFER_SIZE: usize = 2048;

    /// Maximum packet size for UDP
    pub const MAX_PACKET_SIZE: usize = 1472; // MTU - IP/UDP headers

    /// Capacity of the callback hand-off queues, in blocks
    pub const RING_BUFFER_CAPACITY: usize = 256;
}
