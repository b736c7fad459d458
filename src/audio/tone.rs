//! Synthetic sine tone source

use std::time::Instant;

use crate::constants::CANONICAL_SAMPLE_RATE;

/// Amplitude of the generated tone relative to full scale
const TONE_AMPLITUDE: f64 = 0.5;

/// Live sine generator at the canonical rate.
///
/// Produces samples in step with wall-clock time so a consumer that polls
/// it sees a real-time stream.
pub struct ToneGenerator {
    frequency: f64,
    sample_rate: u32,
    phase: f64,
    started: Option<Instant>,
    produced: u64,
}

impl ToneGenerator {
    pub fn new(frequency: u32) -> Self {
        Self {
            frequency: frequency as f64,
            sample_rate: CANONICAL_SAMPLE_RATE,
            phase: 0.0,
            started: None,
            produced: 0,
        }
    }

    /// Render exactly `n` samples, continuing the phase.
    pub fn render(&mut self, n: usize) -> Vec<i16> {
        let step = 2.0 * std::f64::consts::PI * self.frequency / self.sample_rate as f64;
        let samples = (0..n)
            .map(|_| {
                let s = (self.phase.sin() * TONE_AMPLITUDE * i16::MAX as f64).round() as i16;
                self.phase = (self.phase + step) % (2.0 * std::f64::consts::PI);
                s
            })
            .collect();
        self.produced += n as u64;
        samples
    }

    /// Render every sample due by `now`.
    pub fn render_until(&mut self, now: Instant) -> Vec<i16> {
        let started = *self.started.get_or_insert(now);
        let due = (now.duration_since(started).as_micros() as u64 * self.sample_rate as u64) / 1_000_000;
        let n = due.saturating_sub(self.produced) as usize;
        self.render(n)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_phase_is_continuous() {
        let mut a = ToneGenerator::new(1000);
        let mut b = ToneGenerator::new(1000);
        let mut split = a.render(100);
        split.extend(a.render(380));
        assert_eq!(split, b.render(480));
    }

    #[test]
    fn test_render_until_tracks_wall_clock() {
        let mut tone = ToneGenerator::new(440);
        let t0 = Instant::now();
        assert!(tone.render_until(t0).is_empty());
        assert_eq!(tone.render_until(t0 + Duration::from_millis(4)).len(), 192);
        assert_eq!(tone.render_until(t0 + Duration::from_millis(10)).len(), 288);
    }

    #[test]
    fn test_amplitude_bounded() {
        let mut tone = ToneGenerator::new(1000);
        let peak = tone.render(4800).iter().map(|s| (*s as i32).abs()).max().unwrap();
        assert!(peak <= (i16::MAX / 2 + 1) as i32);
        assert!(peak > 16000);
    }
}
