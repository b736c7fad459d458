//! RMS level meter with a decaying peak
//!
//! The meter is clocked by the caller: every mix period it is handed the
//! period's samples (or `None` when the source produced nothing) together
//! with the period length. Once a full interval has elapsed it publishes the
//! RMS of everything observed in that interval, in dBFS. An interval with no
//! observed samples publishes `None`.

use std::time::Duration;

/// Floor reported for digital silence instead of negative infinity
pub const MIN_DB: f64 = -100.0;

/// Level meter configuration
#[derive(Debug, Clone)]
pub struct LevelConfig {
    pub sample_rate: u32,
    /// Publish interval
    pub interval: Duration,
    /// How long a new peak is held before it starts to fall
    pub peak_ttl: Duration,
    /// Peak fall-off rate after the hold expires
    pub peak_falloff_db_per_sec: f64,
}

impl LevelConfig {
    pub fn new(sample_rate: u32, interval: Duration, peak_ttl: Duration) -> Self {
        Self {
            sample_rate,
            interval,
            peak_ttl,
            peak_falloff_db_per_sec: 20.0,
        }
    }
}

/// One published measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReading {
    pub rms_db: Option<f64>,
    pub peak_db: Option<f64>,
}

pub struct LevelMeter {
    config: LevelConfig,
    interval_samples: u64,
    elapsed: u64,
    sum_squares: f64,
    observed: u64,
    interval_peak: i32,
    rms_db: Option<f64>,
    decay_peak_db: Option<f64>,
    peak_age: Duration,
}

impl LevelMeter {
    pub fn new(config: LevelConfig) -> Self {
        let interval_samples =
            ((config.interval.as_micros() as u64 * config.sample_rate as u64) / 1_000_000).max(1);
        Self {
            config,
            interval_samples,
            elapsed: 0,
            sum_squares: 0.0,
            observed: 0,
            interval_peak: 0,
            rms_db: None,
            decay_peak_db: None,
            peak_age: Duration::ZERO,
        }
    }

    /// Account for one period of `period_len` samples.
    ///
    /// Returns a reading whenever an interval completes.
    pub fn process(&mut self, samples: Option<&[i16]>, period_len: usize) -> Option<LevelReading> {
        if let Some(samples) = samples {
            for &s in samples {
                let v = s as f64;
                self.sum_squares += v * v;
                self.interval_peak = self.interval_peak.max((s as i32).abs());
            }
            self.observed += samples.len() as u64;
        }

        self.elapsed += period_len as u64;
        if self.elapsed < self.interval_samples {
            return None;
        }
        self.elapsed -= self.interval_samples;
        Some(self.publish())
    }

    fn publish(&mut self) -> LevelReading {
        let interval_peak_db = if self.observed == 0 {
            None
        } else {
            Some(amplitude_to_db(self.interval_peak as f64))
        };

        self.rms_db = if self.observed == 0 {
            None
        } else {
            Some(amplitude_to_db((self.sum_squares / self.observed as f64).sqrt()))
        };

        self.update_peak(interval_peak_db);

        self.sum_squares = 0.0;
        self.observed = 0;
        self.interval_peak = 0;

        self.reading()
    }

    fn update_peak(&mut self, interval_peak_db: Option<f64>) {
        match (interval_peak_db, self.decay_peak_db) {
            (Some(new), Some(held)) if new >= held => {
                self.decay_peak_db = Some(new);
                self.peak_age = Duration::ZERO;
            }
            (Some(new), None) => {
                self.decay_peak_db = Some(new);
                self.peak_age = Duration::ZERO;
            }
            (_, Some(held)) => {
                self.peak_age += self.config.interval;
                if self.peak_age > self.config.peak_ttl {
                    let fallen = held - self.config.peak_falloff_db_per_sec * self.config.interval.as_secs_f64();
                    let floor = interval_peak_db.unwrap_or(MIN_DB);
                    self.decay_peak_db = if fallen <= MIN_DB && interval_peak_db.is_none() {
                        None
                    } else {
                        Some(fallen.max(floor))
                    };
                }
            }
            (None, None) => {}
        }
    }

    /// Most recently published RMS level, `None` if the last interval saw no samples
    pub fn rms_db(&self) -> Option<f64> {
        self.rms_db
    }

    /// Held/decaying peak level
    pub fn peak_db(&self) -> Option<f64> {
        self.decay_peak_db
    }

    pub fn reading(&self) -> LevelReading {
        LevelReading {
            rms_db: self.rms_db,
            peak_db: self.decay_peak_db,
        }
    }

    pub fn reset(&mut self) {
        self.elapsed = 0;
        self.sum_squares = 0.0;
        self.observed = 0;
        self.interval_peak = 0;
        self.rms_db = None;
        self.decay_peak_db = None;
        self.peak_age = Duration::ZERO;
    }
}

/// Convert a linear amplitude (full scale = 32768) to dBFS.
pub fn amplitude_to_db(amplitude: f64) -> f64 {
    if amplitude <= 0.0 {
        return MIN_DB;
    }
    (20.0 * (amplitude / 32768.0).log10()).max(MIN_DB)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> LevelMeter {
        LevelMeter::new(LevelConfig::new(
            48000,
            Duration::from_millis(100),
            Duration::from_millis(500),
        ))
    }

    #[test]
    fn test_no_samples_is_unknown() {
        let mut m = meter();
        let mut reading = None;
        for _ in 0..10 {
            reading = reading.or(m.process(None, 480));
        }
        let reading = reading.expect("interval completes after 10 periods");
        assert_eq!(reading.rms_db, None);
        assert_eq!(m.rms_db(), None);
    }

    #[test]
    fn test_full_scale_square_is_zero_db() {
        let mut m = meter();
        let frame: Vec<i16> = (0..480).map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN }).collect();
        for _ in 0..10 {
            m.process(Some(&frame), 480);
        }
        let db = m.rms_db().unwrap();
        assert!(db.abs() < 0.01, "got {db}");
    }

    #[test]
    fn test_sine_rms_is_minus_three_db() {
        let mut m = meter();
        let frame: Vec<i16> = (0..480)
            .map(|i| ((i as f64 * 2.0 * std::f64::consts::PI * 1000.0 / 48000.0).sin() * 32767.0) as i16)
            .collect();
        for _ in 0..10 {
            m.process(Some(&frame), 480);
        }
        let db = m.rms_db().unwrap();
        assert!((db + 3.01).abs() < 0.1, "got {db}");
    }

    #[test]
    fn test_silence_is_floor_not_unknown() {
        let mut m = meter();
        let frame = vec![0i16; 480];
        for _ in 0..10 {
            m.process(Some(&frame), 480);
        }
        assert_eq!(m.rms_db(), Some(MIN_DB));
    }

    #[test]
    fn test_publishes_every_interval() {
        let mut m = meter();
        let frame = vec![1000i16; 480];
        let published = (0..30).filter(|_| m.process(Some(&frame), 480).is_some()).count();
        assert_eq!(published, 3);
    }

    #[test]
    fn test_peak_holds_then_decays() {
        let mut m = meter();
        let loud = vec![i16::MAX; 480];
        let quiet = vec![100i16; 480];
        for _ in 0..10 {
            m.process(Some(&loud), 480);
        }
        let held = m.peak_db().unwrap();

        // Within the hold time the peak does not move.
        for _ in 0..50 {
            m.process(Some(&quiet), 480);
        }
        assert_eq!(m.peak_db().unwrap(), held);

        // After it, it falls 2 dB per 100 ms interval.
        for _ in 0..10 {
            m.process(Some(&quiet), 480);
        }
        assert!((m.peak_db().unwrap() - (held - 2.0)).abs() < 1e-9);
    }
}
