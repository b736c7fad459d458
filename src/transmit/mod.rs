//! Transmit encoder
//!
//! Acquires a source (tone or capture device), normalizes to the canonical
//! format, packetizes as RTP L16 and sends to the group. Shares nothing
//! mutable with the receive path.

pub mod source;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::normalize::Resampler;
use crate::codec::{PacketizerConfig, RtpPacketizer};
use crate::constants::*;
use crate::error::{AudioError, Result};
use crate::network::sender::RtpSender;
use crate::protocol::TransmitStats;

pub use source::{open_with_fallback, AudioSource, CpalOpener, SourceOpener, ToneSource};

/// Poll interval of the transmit loop
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Which source to transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Tone,
    Device,
}

/// Parameters for one transmit run
#[derive(Debug, Clone)]
pub struct TxSettings {
    pub group: Ipv4Addr,
    pub port: u16,
    pub ttl: u32,
    pub iface: Option<String>,
    pub bind_address: Option<Ipv4Addr>,
    pub source: SourceKind,
    pub tone_frequency: u32,
    /// Capture device identifier; blank = default input
    pub device: String,
    pub ssrc: u32,
    pub payload_type: u8,
    pub packet_ms: u32,
}

impl Default for TxSettings {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(239, 69, 69, 69),
            port: DEFAULT_PORT,
            ttl: DEFAULT_TTL,
            iface: None,
            bind_address: None,
            source: SourceKind::Tone,
            tone_frequency: DEFAULT_TONE_HZ,
            device: String::new(),
            ssrc: DEFAULT_SSRC,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            packet_ms: DEFAULT_PACKET_MS,
        }
    }
}

/// Transmit handle
pub struct Transmitter {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<TransmitStats>>,
}

impl Transmitter {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            stats: Arc::new(Mutex::new(TransmitStats::default())),
        }
    }

    /// Start transmitting with the cpal device opener.
    pub fn start(&mut self, settings: TxSettings) -> Result<()> {
        self.start_with(settings, &CpalOpener)
    }

    /// Start transmitting. Any running transmitter is stopped first.
    ///
    /// The source and socket are acquired synchronously; on error nothing
    /// is left running.
    pub fn start_with(&mut self, settings: TxSettings, opener: &dyn SourceOpener) -> Result<()> {
        self.stop();

        let source: Box<dyn AudioSource> = match settings.source {
            SourceKind::Tone => Box::new(ToneSource::new(settings.tone_frequency)),
            SourceKind::Device => open_with_fallback(opener, &settings.device)?.source,
        };

        let packetizer = RtpPacketizer::new(PacketizerConfig {
            ssrc: settings.ssrc,
            payload_type: settings.payload_type,
            sample_rate: CANONICAL_SAMPLE_RATE,
            packet_ms: settings.packet_ms,
        })?;

        let sender = RtpSender::new(
            SocketAddrV4::new(settings.group, settings.port),
            settings.ttl,
            settings.iface.as_deref(),
            settings.bind_address,
        )?;

        let description = source.describe();
        *self.stats.lock() = TransmitStats {
            source: description.clone(),
            ..Default::default()
        };

        let running = Arc::new(AtomicBool::new(true));
        let loop_running = running.clone();
        let stats = self.stats.clone();

        let handle = thread::Builder::new()
            .name("tx".to_string())
            .spawn(move || run(source, packetizer, sender, loop_running, stats))
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!(
            "Transmitting {} as SSRC {} to {}:{} ({} ms packets)",
            description,
            settings.ssrc,
            settings.group,
            settings.port,
            settings.packet_ms
        );

        self.running = running;
        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop transmitting. Safe to call when not running.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Transmitter stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some() && self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> TransmitStats {
        self.stats.lock().clone()
    }
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut source: Box<dyn AudioSource>,
    mut packetizer: RtpPacketizer,
    mut sender: RtpSender,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<TransmitStats>>,
) {
    let mut resampler = Resampler::to_canonical(source.sample_rate());
    let mut raw: Vec<i16> = Vec::new();
    let mut canonical: Vec<i16> = Vec::new();

    while running.load(Ordering::Relaxed) {
        raw.clear();
        if let Err(e) = source.read(&mut raw) {
            tracing::error!("Transmit source {} failed: {}", source.describe(), e);
            running.store(false, Ordering::SeqCst);
            break;
        }

        if !raw.is_empty() {
            canonical.clear();
            resampler.process(&raw, &mut canonical);
            packetizer.push(&canonical);
        }

        let mut sent_any = false;
        while let Some(packet) = packetizer.next_packet() {
            if let Err(e) = sender.send(&packet) {
                let errors = sender.stats().send_errors;
                if errors % 100 == 1 {
                    tracing::warn!("Send failed ({} so far): {}", errors, e);
                }
            }
            sent_any = true;
        }
        if sent_any {
            let totals = sender.stats();
            let mut s = stats.lock();
            s.packets_sent = totals.packets_sent;
            s.bytes_sent = totals.bytes_sent;
            s.send_errors = totals.send_errors;
        }

        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RtpPacket;
    use std::net::UdpSocket;

    struct NoDevices;

    impl SourceOpener for NoDevices {
        fn open(&self, device: &str) -> std::result::Result<Box<dyn AudioSource>, AudioError> {
            Err(AudioError::DeviceNotFound(device.to_string()))
        }
    }

    fn loopback_settings(port: u16) -> TxSettings {
        TxSettings {
            group: Ipv4Addr::LOCALHOST,
            port,
            bind_address: Some(Ipv4Addr::LOCALHOST),
            ..Default::default()
        }
    }

    #[test]
    fn test_tone_reaches_receiver() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut tx = Transmitter::new();
        tx.start(loopback_settings(port)).unwrap();
        assert!(tx.is_running());

        let mut buf = [0u8; 2048];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let packet = RtpPacket::parse(&buf[..n]).unwrap();
        assert_eq!(packet.header.ssrc, DEFAULT_SSRC);
        assert_eq!(packet.header.payload_type, 96);
        // 4 ms at 48 kHz, 2 bytes per sample
        assert_eq!(packet.payload.len(), 384);

        tx.stop();
        tx.stop();
        assert!(!tx.is_running());
        let stats = tx.stats();
        assert_eq!(stats.source, "tone:1000");
        assert!(stats.packets_sent >= 1);
    }

    #[test]
    fn test_device_failure_leaves_nothing_running() {
        let mut tx = Transmitter::new();
        let settings = TxSettings {
            source: SourceKind::Device,
            device: "hw:9,0".to_string(),
            ..loopback_settings(9)
        };
        let err = tx.start_with(settings, &NoDevices).unwrap_err();
        assert!(err.to_string().contains("dsnoop:9,0"));
        assert!(!tx.is_running());
    }
}
