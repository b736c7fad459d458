//! Format normalization between wire PCM and the canonical engine format.
//!
//! Wire: L16 (signed 16-bit, network byte order), mono.
//! Canonical: `i16` host order, mono, [`CANONICAL_SAMPLE_RATE`].
//!
//! The free functions are pure and work on whole buffers. Streams that
//! arrive in chunks go through [`Resampler`], which carries its phase and
//! the previous sample from one chunk to the next.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::CANONICAL_SAMPLE_RATE;

/// Decode an L16 payload into host-order samples.
///
/// A trailing odd byte cannot form a sample and is ignored.
pub fn decode_l16(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode host-order samples as an L16 payload.
pub fn encode_l16(samples: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &s in samples {
        buf.put_i16(s);
    }
    buf.freeze()
}

/// Resample mono audio by linear interpolation.
///
/// Produces `round(N * to_rate / from_rate)` output samples. Identical
/// rates return a copy of the input.
pub fn resample(input: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || input.is_empty() || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }

    let out_len = ((input.len() as u64 * to_rate as u64 + from_rate as u64 / 2) / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let frac = pos - idx as f64;
            let a = input[idx] as f64;
            let b = input[(idx + 1).min(last)] as f64;
            (a + (b - a) * frac).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// Streaming linear-interpolation resampler
///
/// The read position is kept exactly, in units of `1 / to_rate` input
/// samples, so chunk boundaries neither add nor drop output and the long-run
/// output rate is exactly `to_rate / from_rate` of the input.
#[derive(Debug, Clone)]
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
    /// Next output position relative to the start of the next chunk; may be
    /// negative down to one input sample, which interpolates from `prev`.
    pos: i64,
    prev: Option<i16>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate: from_rate.max(1),
            to_rate: to_rate.max(1),
            pos: 0,
            prev: None,
        }
    }

    /// Resampler from `from_rate` to the canonical rate.
    pub fn to_canonical(from_rate: u32) -> Self {
        Self::new(from_rate, CANONICAL_SAMPLE_RATE)
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Resample the next chunk of the stream, appending to `out`.
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }
        let Some(&last) = input.last() else {
            return;
        };

        let n = input.len() as i64;
        let to = self.to_rate as i64;
        let prev = self.prev.unwrap_or(input[0]);
        let at = |i: i64| (if i < 0 { prev } else { input[i as usize] }) as f64;

        while self.pos < (n - 1) * to {
            let idx = self.pos.div_euclid(to);
            let frac = self.pos.rem_euclid(to) as f64 / to as f64;
            let (a, b) = (at(idx), at(idx + 1));
            out.push((a + (b - a) * frac).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
            self.pos += self.from_rate as i64;
        }

        self.pos -= n * to;
        self.prev = Some(last);
    }

    /// Forget the stream position, e.g. between talk spurts.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.prev = None;
    }
}

/// Down-mix interleaved `f32` capture data to mono `i16`.
pub fn downmix_f32(interleaved: &[f32], channels: u16) -> Vec<i16> {
    let channels = channels.max(1) as usize;
    interleaved
        .chunks(channels)
        .map(|frame| {
            let avg = frame.iter().sum::<f32>() / frame.len() as f32;
            f32_to_i16(avg)
        })
        .collect()
}

/// Convert a normalized float sample to `i16` with saturation.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Convert an `i16` sample to a normalized float.
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Number of source-rate samples covering `canonical_len` canonical samples.
pub fn source_len_for(canonical_len: usize, source_rate: u32) -> usize {
    let n = (canonical_len as u64 * source_rate as u64 + CANONICAL_SAMPLE_RATE as u64 - 1)
        / CANONICAL_SAMPLE_RATE as u64;
    (n as usize).max(1)
}
