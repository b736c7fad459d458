//! Per-session jitter buffer
//!
//! Packets are keyed by their RTP timestamp, extended to 64 bits so that
//! wrap-around never reorders. Playout starts once the buffered span reaches
//! the target latency; after that the consumer pulls a fixed number of
//! samples per mix period and the playout cursor advances in lock-step with
//! the mix clock. Holes are filled with silence, packets behind the cursor
//! are dropped as late, and a long continuous underrun returns the buffer to
//! the buffering state so the next talk spurt is buffered again.
//!
//! A single straggler far behind the cursor is just late. Only a run of
//! consecutive far-behind packets is taken as the talker restarting its
//! stream with new timestamps. Loss is counted from extended sequence
//! numbers, so a packet that arrives late is never also counted as lost.

use std::collections::BTreeMap;
use std::time::Duration;

/// Consecutive packets further behind the cursor than `max_span` that mark a
/// restarted stream
const RESYNC_AFTER: u32 = 3;

/// Jitter buffer configuration (all durations converted at `clock_rate`)
#[derive(Debug, Clone)]
pub struct JitterConfig {
    /// RTP clock rate of the incoming stream
    pub clock_rate: u32,
    /// Buffered span required before playout starts
    pub latency: Duration,
    /// Buffered span beyond the cursor that triggers a skip-ahead
    pub max_span: Duration,
    /// Continuous underrun after which playout returns to buffering
    pub idle_reset: Duration,
}

impl JitterConfig {
    pub fn new(clock_rate: u32, latency: Duration) -> Self {
        Self {
            clock_rate,
            latency,
            max_span: (latency * 4).max(Duration::from_millis(200)),
            idle_reset: Duration::from_millis(500),
        }
    }

    fn samples(&self, d: Duration) -> u64 {
        (d.as_micros() as u64 * self.clock_rate as u64) / 1_000_000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playout {
    Buffering,
    Playing { cursor: u64 },
}

struct Buffered {
    samples: Vec<i16>,
}

impl Buffered {
    fn len(&self) -> u64 {
        self.samples.len() as u64
    }
}

/// Result of inserting a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Queued,
    /// Arrived after its playout deadline; dropped
    Late,
    Duplicate,
    /// Packet carried no samples
    Empty,
}

/// Result of pulling a block of samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Not playing; nothing was written
    Idle,
    /// `n` samples were written, `concealed` of them synthesized silence
    Played { concealed: usize },
}

/// Jitter buffer statistics
#[derive(Debug, Clone, Default)]
pub struct JitterStats {
    pub received: u64,
    pub late: u64,
    /// Packets never received, from sequence numbers
    pub lost: u64,
    pub duplicates: u64,
    pub sequence_gaps: u64,
    pub concealed_samples: u64,
    pub resyncs: u64,
    pub underruns: u64,
}

impl JitterStats {
    pub fn loss_rate(&self) -> f32 {
        let expected = self.received.saturating_sub(self.duplicates) + self.lost;
        if expected == 0 {
            0.0
        } else {
            self.lost as f32 / expected as f32
        }
    }
}

/// Timestamp-ordered jitter buffer for one talker
pub struct JitterBuffer {
    config: JitterConfig,
    packets: BTreeMap<u64, Buffered>,
    playout: Playout,
    last_ext: Option<u64>,
    sequence: SequenceWindow,
    /// Loss carried over from streams before the last restart
    lost_before_restart: u64,
    stale_run: u32,
    underrun_run: u64,
    stats: JitterStats,
}

/// Extended sequence tracking for one stream epoch
#[derive(Debug, Default)]
struct SequenceWindow {
    base: Option<u64>,
    max: u64,
    received: u64,
}

impl SequenceWindow {
    /// Extend `sequence` against the highest seen so far. Returns the
    /// extended value and how many numbers it skipped forward.
    fn record(&mut self, sequence: u16, may_advance: bool) -> u64 {
        let ext = match self.base {
            None => {
                let ext = (1u64 << 16) | sequence as u64;
                self.base = Some(ext);
                self.max = ext;
                self.received = 1;
                return 0;
            }
            Some(_) => {
                let delta = sequence.wrapping_sub(self.max as u16) as i16 as i64;
                (self.max as i64 + delta).max(0) as u64
            }
        };
        if ext > self.max && !may_advance {
            return 0;
        }
        self.received += 1;
        if let Some(base) = self.base {
            if ext < base {
                self.base = Some(ext);
            }
        }
        if ext > self.max {
            let skipped = ext - self.max - 1;
            self.max = ext;
            return skipped;
        }
        0
    }

    fn unrecord(&mut self) {
        self.received = self.received.saturating_sub(1);
    }

    fn lost(&self) -> u64 {
        match self.base {
            Some(base) => (self.max - base + 1).saturating_sub(self.received),
            None => 0,
        }
    }
}

impl JitterBuffer {
    pub fn new(config: JitterConfig) -> Self {
        Self {
            config,
            packets: BTreeMap::new(),
            playout: Playout::Buffering,
            last_ext: None,
            sequence: SequenceWindow::default(),
            lost_before_restart: 0,
            stale_run: 0,
            underrun_run: 0,
            stats: JitterStats::default(),
        }
    }

    /// Insert one packet's worth of host-order samples.
    pub fn insert(&mut self, sequence: u16, timestamp: u32, samples: Vec<i16>) -> InsertOutcome {
        self.stats.received += 1;

        if samples.is_empty() {
            self.track_sequence(sequence, true);
            return InsertOutcome::Empty;
        }

        let ext = self.extend_timestamp(timestamp);
        let len = samples.len() as u64;

        if let Playout::Playing { cursor } = self.playout {
            if ext + len <= cursor {
                let stale = cursor - ext > self.config.samples(self.config.max_span);
                if stale {
                    self.stale_run += 1;
                    if self.stale_run >= RESYNC_AFTER {
                        // Timestamps keep coming from far behind: the talker restarted.
                        self.restart();
                        return self.insert_fresh(sequence, timestamp, samples);
                    }
                } else {
                    self.stale_run = 0;
                }
                // A far-behind packet may belong to a new stream; it must not
                // move the sequence window.
                self.track_sequence(sequence, !stale);
                self.stats.late += 1;
                return InsertOutcome::Late;
            }
        }
        self.stale_run = 0;
        self.track_sequence(sequence, true);

        if self.packets.contains_key(&ext) {
            self.stats.duplicates += 1;
            self.sequence.unrecord();
            self.stats.lost = self.lost_before_restart + self.sequence.lost();
            return InsertOutcome::Duplicate;
        }

        self.packets.insert(ext, Buffered { samples });
        self.update_playout();
        InsertOutcome::Queued
    }

    fn insert_fresh(&mut self, sequence: u16, timestamp: u32, samples: Vec<i16>) -> InsertOutcome {
        self.stats.received -= 1;
        self.insert(sequence, timestamp, samples)
    }

    /// Pull exactly `n` samples into `out`, or nothing if not playing.
    pub fn pull(&mut self, n: usize, out: &mut Vec<i16>) -> PullOutcome {
        let mut cursor = match self.playout {
            Playout::Buffering => return PullOutcome::Idle,
            Playout::Playing { cursor } => cursor,
        };

        let mut remaining = n as u64;
        let mut concealed = 0u64;

        while remaining > 0 {
            while let Some((&key, packet)) = self.packets.first_key_value() {
                if key + packet.len() <= cursor {
                    self.packets.pop_first();
                } else {
                    break;
                }
            }

            match self.packets.first_key_value() {
                Some((&key, packet)) if key <= cursor => {
                    let offset = (cursor - key) as usize;
                    let take = remaining.min(packet.len() - offset as u64) as usize;
                    out.extend_from_slice(&packet.samples[offset..offset + take]);
                    cursor += take as u64;
                    remaining -= take as u64;
                    self.underrun_run = 0;
                }
                Some((&key, _)) => {
                    let gap = remaining.min(key - cursor);
                    out.resize(out.len() + gap as usize, 0);
                    cursor += gap;
                    remaining -= gap;
                    concealed += gap;
                }
                None => {
                    out.resize(out.len() + remaining as usize, 0);
                    cursor += remaining;
                    concealed += remaining;
                    self.underrun_run += remaining;
                    remaining = 0;
                }
            }
        }

        self.stats.concealed_samples += concealed;

        if self.underrun_run >= self.config.samples(self.config.idle_reset) {
            self.stats.underruns += 1;
            self.underrun_run = 0;
            self.playout = Playout::Buffering;
        } else {
            self.playout = Playout::Playing { cursor };
        }

        PullOutcome::Played {
            concealed: concealed as usize,
        }
    }

    /// Drop every buffered packet and return to buffering.
    pub fn reset(&mut self) {
        self.packets.clear();
        self.playout = Playout::Buffering;
        self.underrun_run = 0;
    }

    fn restart(&mut self) {
        self.reset();
        self.last_ext = None;
        self.lost_before_restart = self.stats.lost;
        self.sequence = SequenceWindow::default();
        self.stale_run = 0;
        self.stats.resyncs += 1;
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.playout, Playout::Playing { .. })
    }

    /// Samples buffered ahead of the playout cursor
    pub fn buffered_samples(&self) -> u64 {
        let start = match self.playout {
            Playout::Playing { cursor } => cursor,
            Playout::Buffering => match self.packets.first_key_value() {
                Some((&key, _)) => key,
                None => return 0,
            },
        };
        self.end().saturating_sub(start)
    }

    pub fn stats(&self) -> &JitterStats {
        &self.stats
    }

    pub fn config(&self) -> &JitterConfig {
        &self.config
    }

    fn end(&self) -> u64 {
        self.packets
            .iter()
            .next_back()
            .map(|(&key, packet)| key + packet.len())
            .unwrap_or(0)
    }

    fn update_playout(&mut self) {
        if self.playout == Playout::Buffering {
            if let Some((&first, _)) = self.packets.first_key_value() {
                if self.end() - first >= self.config.samples(self.config.latency) {
                    self.playout = Playout::Playing { cursor: first };
                    self.underrun_run = 0;
                }
            }
        }

        if let Playout::Playing { cursor } = self.playout {
            let end = self.end();
            if end > cursor && end - cursor > self.config.samples(self.config.max_span) {
                let target = end - self.config.samples(self.config.latency);
                while let Some((&key, packet)) = self.packets.first_key_value() {
                    if key + packet.len() <= target {
                        self.packets.pop_first();
                    } else {
                        break;
                    }
                }
                self.playout = Playout::Playing { cursor: target };
                self.stats.resyncs += 1;
            }
        }
    }

    fn extend_timestamp(&mut self, timestamp: u32) -> u64 {
        let ext = match self.last_ext {
            // Start one full cycle in so backwards deltas never underflow.
            None => (1u64 << 32) | timestamp as u64,
            Some(last) => {
                let delta = timestamp.wrapping_sub(last as u32) as i32 as i64;
                (last as i64 + delta).max(0) as u64
            }
        };
        if self.last_ext.map_or(true, |last| ext > last) {
            self.last_ext = Some(ext);
        }
        ext
    }

    fn track_sequence(&mut self, sequence: u16, may_advance: bool) {
        self.stats.sequence_gaps += self.sequence.record(sequence, may_advance);
        self.stats.lost = self.lost_before_restart + self.sequence.lost();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PKT: usize = 192; // 4 ms at 48 kHz

    fn buffer() -> JitterBuffer {
        JitterBuffer::new(JitterConfig::new(48000, Duration::from_millis(10)))
    }

    fn packet(index: u32) -> Vec<i16> {
        vec![(index + 1) as i16; PKT]
    }

    #[test]
    fn test_buffers_until_latency() {
        let mut jitter = buffer();
        assert_eq!(jitter.insert(0, 0, packet(0)), InsertOutcome::Queued);

        let mut out = Vec::new();
        assert_eq!(jitter.pull(480, &mut out), PullOutcome::Idle);
        assert!(out.is_empty());
        assert!(!jitter.is_playing());
    }

    #[test]
    fn test_out_of_order_released_in_timestamp_order() {
        let mut jitter = buffer();
        jitter.insert(0, 0, packet(0));
        jitter.insert(2, 384, packet(2));
        jitter.insert(1, 192, packet(1));

        let mut out = Vec::new();
        assert_eq!(jitter.pull(576, &mut out), PullOutcome::Played { concealed: 0 });
        assert!(out[..192].iter().all(|&s| s == 1));
        assert!(out[192..384].iter().all(|&s| s == 2));
        assert!(out[384..].iter().all(|&s| s == 3));
    }

    #[test]
    fn test_late_packet_dropped_without_stalling() {
        let mut jitter = buffer();
        jitter.insert(0, 0, packet(0));
        jitter.insert(2, 384, packet(2));
        jitter.insert(3, 576, packet(3));

        let mut out = Vec::new();
        assert_eq!(jitter.pull(576, &mut out), PullOutcome::Played { concealed: 192 });
        assert!(out[192..384].iter().all(|&s| s == 0));
        assert_eq!(jitter.stats().lost, 1);

        assert_eq!(jitter.insert(1, 192, packet(1)), InsertOutcome::Late);
        assert_eq!(jitter.stats().late, 1);
        // It arrived, so it no longer counts as lost.
        assert_eq!(jitter.stats().lost, 0);

        out.clear();
        assert_eq!(jitter.pull(192, &mut out), PullOutcome::Played { concealed: 0 });
        assert!(out.iter().all(|&s| s == 4));
    }

    #[test]
    fn test_far_late_straggler_keeps_playout_running() {
        const FRAME: usize = 480;
        let mut jitter = JitterBuffer::new(JitterConfig::new(48000, Duration::from_millis(50)));
        let block = |i: u32| vec![(i + 1) as i16; FRAME];

        for i in 0..6u32 {
            jitter.insert(i as u16, i * FRAME as u32, block(i));
        }
        assert!(jitter.is_playing());

        // One packet per mix period; packet 10 is held back.
        let mut out = Vec::new();
        for pull in 0..35u32 {
            out.clear();
            jitter.pull(FRAME, &mut out);
            let next = pull + 6;
            if next != 10 {
                jitter.insert(next as u16, next * FRAME as u32, block(next));
            }
        }

        let buffered = jitter.buffered_samples();
        assert_eq!(jitter.insert(10, 10 * FRAME as u32, block(10)), InsertOutcome::Late);
        assert_eq!(jitter.buffered_samples(), buffered);
        assert_eq!(jitter.stats().resyncs, 0);
        assert_eq!(jitter.stats().late, 1);
        assert_eq!(jitter.stats().lost, 0);

        out.clear();
        assert_eq!(jitter.pull(FRAME, &mut out), PullOutcome::Played { concealed: 0 });
        assert!(out.iter().all(|&s| s == 36));
    }

    #[test]
    fn test_restarted_stream_resyncs_after_consecutive_stale_packets() {
        let mut jitter = buffer();
        let base = 1_000_000u32;
        for i in 0..4u32 {
            jitter.insert(i as u16, base + i * PKT as u32, packet(i));
        }
        assert!(jitter.is_playing());

        // New stream: timestamps far behind, unrelated sequence numbers.
        let restarted = |i: u32| (9000 + i) as u16;
        assert_eq!(jitter.insert(restarted(0), 0, packet(0)), InsertOutcome::Late);
        assert_eq!(jitter.insert(restarted(1), PKT as u32, packet(1)), InsertOutcome::Late);
        assert_eq!(jitter.stats().resyncs, 0);
        assert_eq!(jitter.insert(restarted(2), 2 * PKT as u32, packet(2)), InsertOutcome::Queued);
        assert_eq!(jitter.stats().resyncs, 1);
        assert!(!jitter.is_playing());
        assert_eq!(jitter.buffered_samples(), PKT as u64);
    }

    #[test]
    fn test_loss_counts_missing_packets() {
        let mut jitter = buffer();
        for seq in [0u16, 1, 4, 5] {
            jitter.insert(seq, seq as u32 * PKT as u32, packet(seq as u32));
        }
        assert_eq!(jitter.stats().lost, 2);
        assert!((jitter.stats().loss_rate() - 2.0 / 6.0).abs() < 1e-6);

        jitter.insert(4, 4 * PKT as u32, packet(4));
        assert_eq!(jitter.stats().duplicates, 1);
        assert_eq!(jitter.stats().lost, 2);
    }

    #[test]
    fn test_underrun_synthesizes_silence_then_idles() {
        let mut jitter = buffer();
        for i in 0..3 {
            jitter.insert(i as u16, i * PKT as u32, packet(i));
        }

        let mut out = Vec::new();
        jitter.pull(576, &mut out);
        out.clear();

        assert_eq!(jitter.pull(24000, &mut out), PullOutcome::Played { concealed: 24000 });
        assert_eq!(out.len(), 24000);
        assert!(out.iter().all(|&s| s == 0));
        assert_eq!(jitter.stats().underruns, 1);

        out.clear();
        assert_eq!(jitter.pull(480, &mut out), PullOutcome::Idle);
    }

    #[test]
    fn test_timestamp_wraparound() {
        let mut jitter = buffer();
        let base = u32::MAX - (PKT as u32 - 1);
        jitter.insert(0, base, packet(0));
        jitter.insert(2, base.wrapping_add(2 * PKT as u32), packet(2));
        jitter.insert(1, base.wrapping_add(PKT as u32), packet(1));

        let mut out = Vec::new();
        jitter.pull(576, &mut out);
        assert_eq!(out[0], 1);
        assert_eq!(out[200], 2);
        assert_eq!(out[400], 3);
    }

    #[test]
    fn test_overflow_skips_ahead() {
        let mut jitter = buffer();
        for i in 0..60u32 {
            jitter.insert(i as u16, i * PKT as u32, packet(i));
        }
        assert_eq!(jitter.stats().resyncs, 1);

        let mut out = Vec::new();
        jitter.pull(96, &mut out);
        assert_eq!(out[0], 49);
    }

    #[test]
    fn test_duplicate() {
        let mut jitter = buffer();
        jitter.insert(0, 0, packet(0));
        assert_eq!(jitter.insert(0, 0, packet(0)), InsertOutcome::Duplicate);
        assert_eq!(jitter.stats().duplicates, 1);
    }

    #[test]
    fn test_sequence_gaps_counted() {
        let mut jitter = buffer();
        jitter.insert(0, 0, packet(0));
        jitter.insert(3, 576, packet(3));
        assert_eq!(jitter.stats().sequence_gaps, 2);
    }

    #[test]
    fn test_empty_payload() {
        let mut jitter = buffer();
        assert_eq!(jitter.insert(0, 0, Vec::new()), InsertOutcome::Empty);
        assert_eq!(jitter.stats().received, 1);
    }
}
