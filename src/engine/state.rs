//! Engine stream state
//!
//! Everything the ingest listener and the mix loop share. Both threads take
//! the single lock around this struct; neither does I/O while holding it.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::audio::jitter::JitterConfig;
use crate::audio::level::{LevelConfig, LevelMeter};
use crate::audio::mixer::{MixedFrame, Mixer};
use crate::codec::RtpPacket;
use crate::constants::CANONICAL_SAMPLE_RATE;
use crate::engine::RxSettings;
use crate::error::CodecError;
use crate::network::monitor::TrafficWindow;
use crate::protocol::{round_to, SessionSnapshot, TrafficSnapshot};
use crate::session::SessionRegistry;

pub struct StreamState {
    group: Ipv4Addr,
    port: u16,
    iface: Option<String>,
    payload_type: u8,
    registry: SessionRegistry,
    mix_meter: LevelMeter,
    mix_level_db: Option<f64>,
    traffic: TrafficWindow,
    malformed: u64,
    evicted: u64,
}

impl StreamState {
    pub fn new(settings: &RxSettings) -> Self {
        let jitter = JitterConfig::new(settings.clock_rate, settings.jitter_latency);
        let meter = LevelConfig::new(CANONICAL_SAMPLE_RATE, settings.meter_interval, settings.peak_ttl);

        Self {
            group: settings.group,
            port: settings.port,
            iface: settings.iface.clone(),
            payload_type: settings.payload_type,
            registry: SessionRegistry::new(settings.names.clone(), jitter, meter.clone()),
            mix_meter: LevelMeter::new(meter),
            mix_level_db: None,
            traffic: TrafficWindow::new(),
            malformed: 0,
            evicted: 0,
        }
    }

    /// Route one datagram to its session. Returns the SSRC it was routed to.
    ///
    /// Every datagram counts toward traffic; malformed ones are counted and
    /// dropped.
    pub fn ingest(&mut self, datagram: &[u8], now: Instant) -> Result<u32, CodecError> {
        self.traffic.record(now, datagram.len());

        let packet = match RtpPacket::parse_expecting(datagram, self.payload_type) {
            Ok(packet) => packet,
            Err(e) => {
                self.malformed += 1;
                return Err(e);
            }
        };

        let ssrc = packet.header.ssrc;
        let (session, created) = self.registry.get_or_create(ssrc, now);
        if created {
            tracing::info!("Talker joined: {} (SSRC {})", session.name(), ssrc);
        }
        session.on_packet(&packet, now);
        Ok(ssrc)
    }

    /// Receive timeout with nothing read
    pub fn on_receive_timeout(&mut self) {
        self.traffic.decay();
    }

    /// Render one frame from every session and mix them.
    pub fn mix_next_frame(&mut self, mixer: &mut Mixer) -> MixedFrame {
        let frame_len = mixer.frame_len();
        let inputs: Vec<&[i16]> = self
            .registry
            .iter_mut()
            .filter_map(|session| session.render(frame_len))
            .collect();
        let mixed = mixer.mix(&inputs);

        // Frames with no contributors count as "no samples" for the meter.
        let observed = mixed.has_audio().then_some(&mixed.samples[..]);
        if let Some(reading) = self.mix_meter.process(observed, frame_len) {
            self.mix_level_db = reading.rms_db;
        }
        mixed
    }

    /// Retire sessions idle for at least `timeout`.
    pub fn evict_idle(&mut self, now: Instant, timeout: Duration) -> Vec<u32> {
        let evicted = self.registry.evict_idle(now, timeout);
        for ssrc in &evicted {
            tracing::info!("Talker {} idle for {:?}, retired", ssrc, timeout);
        }
        self.evicted += evicted.len() as u64;
        evicted
    }

    pub fn sessions(&self, now: Instant) -> Vec<SessionSnapshot> {
        self.registry.snapshot(now)
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Mix loudness in dBFS, rounded to 0.1 dB
    pub fn mix_level_db(&self) -> Option<f64> {
        self.mix_level_db.map(|db| round_to(db, 1))
    }

    pub fn traffic(&self, now: Instant) -> TrafficSnapshot {
        let mut snapshot = self.traffic.snapshot(now);
        snapshot.group = Some(self.group.to_string());
        snapshot.port = Some(self.port);
        snapshot.iface = self.iface.clone();
        snapshot
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}
