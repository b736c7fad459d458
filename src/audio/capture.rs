//! Hardware capture
//!
//! The input callback down-mixes whatever the device delivers to mono `i16`
//! at the negotiated rate and pushes it into a block queue for the transmit
//! loop, which resamples to the canonical rate.

use cpal::traits::DeviceTrait;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::buffer::{PcmBlock, SharedBlockQueue};
use crate::audio::device::{find_input_device, negotiate_config};
use crate::audio::normalize::downmix_f32;
use crate::audio::stream::StreamThread;
use crate::error::AudioError;

/// A running input stream on one device
pub struct AudioCapture {
    device_id: String,
    sample_rate: u32,
    stream: StreamThread,
    errors: Receiver<AudioError>,
    samples_captured: Arc<AtomicU64>,
}

impl AudioCapture {
    /// Open `device_id` (empty = host default) and start capturing into
    /// `queue`. Returns only once samples are flowing.
    pub fn open(device_id: &str, queue: SharedBlockQueue) -> Result<Self, AudioError> {
        let device = find_input_device(device_id)?;
        let default_config = device.inner().default_input_config()?;
        let config = negotiate_config(&default_config, device.inner().supported_input_configs()?);
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let (error_tx, errors) = bounded::<AudioError>(16);
        let samples_captured = Arc::new(AtomicU64::new(0));
        let counter = samples_captured.clone();
        let block_seq = AtomicU32::new(0);

        let stream = StreamThread::spawn(&format!("capture-{}", device_id), move || {
            device
                .into_inner()
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let mono = downmix_f32(data, channels);
                        counter.fetch_add(mono.len() as u64, Ordering::Relaxed);
                        let seq = block_seq.fetch_add(1, Ordering::Relaxed);
                        queue.push(PcmBlock::new(mono, sample_rate, seq));
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                )
                .map_err(|e| e.to_string())
        })
        .map_err(|e| AudioError::StreamError(format!("{}: {}", device_id, e)))?;

        tracing::info!("Capturing from {} at {} Hz, {} channels", device_id, sample_rate, channels);
        Ok(Self {
            device_id: device_id.to_string(),
            sample_rate,
            stream,
            errors,
            samples_captured,
        })
    }

    pub fn stop(&mut self) {
        self.stream.stop();
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_running()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Rate the device was opened at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    /// First error the driver raised since the last call, if any
    pub fn check_errors(&self) -> Option<AudioError> {
        self.errors.try_recv().ok()
    }
}
