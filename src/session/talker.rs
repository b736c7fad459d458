//! Per-talker receive session

use std::collections::VecDeque;
use std::time::Instant;

use crate::audio::jitter::{InsertOutcome, JitterBuffer, JitterConfig, JitterStats, PullOutcome};
use crate::audio::level::{LevelConfig, LevelMeter};
use crate::audio::normalize::{decode_l16, source_len_for, Resampler};
use crate::codec::RtpPacket;

/// One active talker, keyed by SSRC
pub struct Session {
    ssrc: u32,
    name: String,
    packets: u64,
    last_activity: Instant,
    level_db: Option<f64>,
    jitter: JitterBuffer,
    resampler: Resampler,
    meter: LevelMeter,
    /// Canonical samples released by the jitter buffer, not yet mixed
    pending: VecDeque<i16>,
    scratch: Vec<i16>,
    canonical: Vec<i16>,
    frame: Vec<i16>,
}

impl Session {
    pub fn new(ssrc: u32, name: String, jitter: JitterConfig, meter: LevelConfig, now: Instant) -> Self {
        Self {
            ssrc,
            name,
            packets: 0,
            last_activity: now,
            level_db: None,
            resampler: Resampler::to_canonical(jitter.clock_rate),
            jitter: JitterBuffer::new(jitter),
            meter: LevelMeter::new(meter),
            pending: VecDeque::new(),
            scratch: Vec::new(),
            canonical: Vec::new(),
            frame: Vec::new(),
        }
    }

    /// Account for one valid datagram and queue its audio.
    pub fn on_packet(&mut self, packet: &RtpPacket, now: Instant) -> InsertOutcome {
        self.packets += 1;
        self.last_activity = now;
        let samples = decode_l16(&packet.payload);
        self.jitter.insert(packet.header.sequence, packet.header.timestamp, samples)
    }

    /// Produce this session's next canonical frame of `frame_len` samples.
    ///
    /// Returns `None` when the session had nothing to play this period; the
    /// level meter is advanced either way.
    pub fn render(&mut self, frame_len: usize) -> Option<&[i16]> {
        let clock_rate = self.jitter.config().clock_rate;
        let chunk = source_len_for(frame_len, clock_rate);

        while self.pending.len() < frame_len {
            self.scratch.clear();
            match self.jitter.pull(chunk, &mut self.scratch) {
                PullOutcome::Idle => {
                    self.resampler.reset();
                    break;
                }
                PullOutcome::Played { .. } => {
                    self.canonical.clear();
                    self.resampler.process(&self.scratch, &mut self.canonical);
                    self.pending.extend(self.canonical.iter().copied());
                }
            }
        }

        let has_audio = !self.pending.is_empty();
        let take = frame_len.min(self.pending.len());
        self.frame.clear();
        self.frame.extend(self.pending.drain(..take));
        self.frame.resize(frame_len, 0);

        if let Some(reading) = self.meter.process(has_audio.then_some(&self.frame[..]), frame_len) {
            self.level_db = reading.rms_db;
        }

        has_audio.then_some(&self.frame[..])
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn level_db(&self) -> Option<f64> {
        self.level_db
    }

    pub fn peak_db(&self) -> Option<f64> {
        self.meter.peak_db()
    }

    pub fn jitter_stats(&self) -> &JitterStats {
        self.jitter.stats()
    }
}
