//! Live playback sink
//!
//! [`Sink::write`] resamples the mix to the device rate and queues it; the
//! output callback drains the queue and copies each mono sample to every
//! device channel.

use cpal::traits::DeviceTrait;
use crossbeam_channel::{bounded, Receiver};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::buffer::{BlockQueue, PcmBlock, SharedBlockQueue};
use crate::audio::device::{find_output_device, negotiate_config};
use crate::audio::normalize::{i16_to_f32, Resampler};
use crate::audio::stream::StreamThread;
use crate::constants::{CANONICAL_SAMPLE_RATE, RING_BUFFER_CAPACITY};
use crate::error::SinkError;
use crate::sink::Sink;

pub struct LiveSink {
    device_name: String,
    device_rate: u32,
    queue: SharedBlockQueue,
    stream: Option<StreamThread>,
    errors: Receiver<String>,
    resampler: Resampler,
    block_seq: u32,
    /// Samples the device asked for but did not get
    starved: Arc<AtomicU64>,
}

impl LiveSink {
    /// Open a playback device (`None` = host default) and start its stream.
    pub fn open(device: Option<&str>) -> Result<Self, SinkError> {
        let device = find_output_device(device).map_err(|e| SinkError::Open(e.to_string()))?;
        let device_name = device.name.clone();

        let default_config = device
            .inner()
            .default_output_config()
            .map_err(|e| open_error(&device_name, e))?;
        let supported = device
            .inner()
            .supported_output_configs()
            .map_err(|e| open_error(&device_name, e))?;
        let config = negotiate_config(&default_config, supported);
        let device_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let queue = BlockQueue::shared(RING_BUFFER_CAPACITY);
        let starved = Arc::new(AtomicU64::new(0));
        let (error_tx, errors) = bounded::<String>(16);

        let source = queue.clone();
        let starved_counter = starved.clone();
        let stream = StreamThread::spawn("playback", move || {
            let mut carry = VecDeque::new();
            device
                .into_inner()
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let missing = fill_interleaved(data, channels, &mut carry, &source);
                        if missing > 0 {
                            starved_counter.fetch_add(missing, Ordering::Relaxed);
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(err.to_string());
                    },
                    None,
                )
                .map_err(|e| e.to_string())
        })
        .map_err(|e| open_error(&device_name, e))?;

        tracing::info!(
            "Live playback on {} ({} Hz, {} channels)",
            device_name,
            device_rate,
            channels
        );
        Ok(Self {
            device_name,
            device_rate,
            queue,
            stream: Some(stream),
            errors,
            resampler: Resampler::new(CANONICAL_SAMPLE_RATE, device_rate),
            block_seq: 0,
            starved,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Samples the device had to fill with silence
    pub fn starved_samples(&self) -> u64 {
        self.starved.load(Ordering::Relaxed)
    }
}

fn open_error(device: &str, e: impl std::fmt::Display) -> SinkError {
    SinkError::Open(format!("{}: {}", device, e))
}

/// Fill an interleaved output buffer from queued mono blocks, duplicating
/// each sample across `channels`. Returns how many frames were silence.
fn fill_interleaved(out: &mut [f32], channels: usize, carry: &mut VecDeque<i16>, queue: &BlockQueue) -> u64 {
    let mut missing = 0;
    for frame in out.chunks_mut(channels.max(1)) {
        if carry.is_empty() {
            if let Some(block) = queue.pop() {
                carry.extend(block.samples);
            }
        }
        let value = match carry.pop_front() {
            Some(sample) => i16_to_f32(sample),
            None => {
                missing += 1;
                0.0
            }
        };
        frame.fill(value);
    }
    missing
}

impl Sink for LiveSink {
    fn write(&mut self, frame: &[i16]) -> Result<(), SinkError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(SinkError::Write(format!("{}: {}", self.device_name, err)));
        }
        if self.stream.is_none() {
            return Err(SinkError::Write(format!("{} already finished", self.device_name)));
        }

        let mut samples = Vec::with_capacity(frame.len());
        self.resampler.process(frame, &mut samples);
        let fresh = self.queue.push(PcmBlock::new(samples, self.device_rate, self.block_seq));
        self.block_seq = self.block_seq.wrapping_add(1);

        if !fresh && self.queue.displaced() % 100 == 1 {
            tracing::warn!(
                "Playback behind on {}, {} blocks dropped",
                self.device_name,
                self.queue.displaced()
            );
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::info!("Live playback on {} stopped", self.device_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_duplicates_mono_across_channels() {
        let queue = BlockQueue::new(4);
        queue.push(PcmBlock::new(vec![i16::MAX, 0], 48000, 0));
        let mut carry = VecDeque::new();
        let mut out = [9.0f32; 6];

        let missing = fill_interleaved(&mut out, 2, &mut carry, &queue);

        assert_eq!(missing, 1);
        assert_eq!(&out[..2], &[i16_to_f32(i16::MAX); 2]);
        assert_eq!(&out[2..], &[0.0; 4]);
    }

    #[test]
    fn test_fill_carries_partial_blocks() {
        let queue = BlockQueue::new(4);
        queue.push(PcmBlock::new(vec![100, 200, 300], 48000, 0));
        let mut carry = VecDeque::new();
        let mut out = [0.0f32; 2];

        assert_eq!(fill_interleaved(&mut out, 1, &mut carry, &queue), 0);
        assert_eq!(carry, VecDeque::from(vec![300]));
        assert_eq!(fill_interleaved(&mut out, 1, &mut carry, &queue), 1);
        assert_eq!(out, [i16_to_f32(300), 0.0]);
    }
}
