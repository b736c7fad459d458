//! Saturating mono mixer
//!
//! Sums one frame from every contributing session in an `i32` accumulator
//! and hard-clips the result to the `i16` range. Sessions join or leave only
//! between frames, so a departing talker simply stops contributing at a
//! frame boundary.

/// One mixed output frame
#[derive(Debug, Clone)]
pub struct MixedFrame {
    pub samples: Vec<i16>,
    /// Number of sessions that contributed audio to this frame
    pub contributors: usize,
}

impl MixedFrame {
    pub fn has_audio(&self) -> bool {
        self.contributors > 0
    }
}

/// Mixer statistics
#[derive(Debug, Clone, Default)]
pub struct MixerStats {
    pub frames_mixed: u64,
    pub clipped_samples: u64,
}

pub struct Mixer {
    frame_len: usize,
    accumulator: Vec<i32>,
    stats: MixerStats,
}

impl Mixer {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            accumulator: vec![0; frame_len],
            stats: MixerStats::default(),
        }
    }

    /// Mix one frame from each input.
    ///
    /// Inputs shorter than the frame contribute silence for the remainder;
    /// longer inputs are truncated.
    pub fn mix(&mut self, inputs: &[&[i16]]) -> MixedFrame {
        self.accumulator.iter_mut().for_each(|acc| *acc = 0);

        for input in inputs {
            for (acc, &s) in self.accumulator.iter_mut().zip(input.iter()) {
                *acc += s as i32;
            }
        }

        let mut clipped = 0u64;
        let samples = self
            .accumulator
            .iter()
            .map(|&acc| {
                if acc > i16::MAX as i32 || acc < i16::MIN as i32 {
                    clipped += 1;
                }
                acc.clamp(i16::MIN as i32, i16::MAX as i32) as i16
            })
            .collect();

        self.stats.frames_mixed += 1;
        self.stats.clipped_samples += clipped;

        MixedFrame {
            samples,
            contributors: inputs.len(),
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn stats(&self) -> &MixerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tone(amplitude: f64, phase: f64) -> Vec<i16> {
        (0..480)
            .map(|i| {
                let t = i as f64 / 48000.0;
                ((2.0 * std::f64::consts::PI * 1000.0 * t + phase).sin() * amplitude).round() as i16
            })
            .collect()
    }

    #[test]
    fn test_single_input_passthrough() {
        let mut mixer = Mixer::new(480);
        let input = tone(32767.0, 0.0);
        let out = mixer.mix(&[&input]);
        assert_eq!(out.samples, input);
        assert_eq!(out.contributors, 1);
        assert_eq!(mixer.stats().clipped_samples, 0);
    }

    #[test]
    fn test_two_full_scale_tones_saturate() {
        let mut mixer = Mixer::new(480);
        let a = tone(32767.0, 0.0);
        let b = tone(32767.0, 0.0);
        let out = mixer.mix(&[&a, &b]);
        assert!(out.samples.contains(&i16::MAX));
        assert!(out.samples.contains(&i16::MIN));
        assert!(mixer.stats().clipped_samples > 0);
    }

    #[test]
    fn test_no_inputs_is_silence() {
        let mut mixer = Mixer::new(480);
        let out = mixer.mix(&[]);
        assert!(!out.has_audio());
        assert_eq!(out.samples, vec![0; 480]);
    }

    #[test]
    fn test_short_input_padded() {
        let mut mixer = Mixer::new(4);
        let out = mixer.mix(&[&[1, 2]]);
        assert_eq!(out.samples, vec![1, 2, 0, 0]);
    }

    proptest! {
        #[test]
        fn prop_sum_is_saturated(a in prop::collection::vec(any::<i16>(), 64), b in prop::collection::vec(any::<i16>(), 64)) {
            let mut mixer = Mixer::new(64);
            let out = mixer.mix(&[&a, &b]);
            for i in 0..64 {
                let exact = a[i] as i32 + b[i] as i32;
                prop_assert_eq!(out.samples[i] as i32, exact.clamp(i16::MIN as i32, i16::MAX as i32));
            }
        }
    }
}
