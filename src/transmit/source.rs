//! Transmit audio sources and device acquisition
//!
//! Sources are polled, never block, and hand back whatever samples are ready
//! at their native rate. Device sources are opened through a
//! [`SourceOpener`] so the fallback policy can be exercised without hardware.

use std::time::Instant;

use crate::audio::buffer::{BlockQueue, SharedBlockQueue};
use crate::audio::capture::AudioCapture;
use crate::audio::device::{normalize_device_id, preferred_variant, shared_variant};
use crate::audio::tone::ToneGenerator;
use crate::constants::RING_BUFFER_CAPACITY;
use crate::error::AudioError;

/// Polled mono `i16` audio source
pub trait AudioSource: Send {
    /// Native sample rate of the samples returned by [`read`](Self::read)
    fn sample_rate(&self) -> u32;

    /// Append every sample available now.
    fn read(&mut self, out: &mut Vec<i16>) -> Result<(), AudioError>;

    /// Human-readable source name
    fn describe(&self) -> String;
}

/// Sine tone paced by the wall clock
pub struct ToneSource {
    generator: ToneGenerator,
}

impl ToneSource {
    pub fn new(frequency: u32) -> Self {
        Self {
            generator: ToneGenerator::new(frequency),
        }
    }
}

impl AudioSource for ToneSource {
    fn sample_rate(&self) -> u32 {
        self.generator.sample_rate()
    }

    fn read(&mut self, out: &mut Vec<i16>) -> Result<(), AudioError> {
        out.extend(self.generator.render_until(Instant::now()));
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tone:{}", self.generator.frequency())
    }
}

/// Hardware capture device
pub struct CaptureSource {
    capture: AudioCapture,
    buffer: SharedBlockQueue,
}

impl AudioSource for CaptureSource {
    fn sample_rate(&self) -> u32 {
        self.capture.sample_rate()
    }

    fn read(&mut self, out: &mut Vec<i16>) -> Result<(), AudioError> {
        if let Some(err) = self.capture.check_errors() {
            return Err(err);
        }
        self.buffer.drain_into(out);
        Ok(())
    }

    fn describe(&self) -> String {
        self.capture.device_id().to_string()
    }
}

/// Opens a capture device by its (already normalized) identifier
pub trait SourceOpener {
    fn open(&self, device: &str) -> Result<Box<dyn AudioSource>, AudioError>;
}

/// Opens devices through cpal
pub struct CpalOpener;

impl SourceOpener for CpalOpener {
    fn open(&self, device: &str) -> Result<Box<dyn AudioSource>, AudioError> {
        let buffer = BlockQueue::shared(RING_BUFFER_CAPACITY);
        let capture = AudioCapture::open(device, buffer.clone())?;
        Ok(Box::new(CaptureSource { capture, buffer }))
    }
}

/// A source together with the device string that actually opened
pub struct OpenedSource {
    pub source: Box<dyn AudioSource>,
    pub device: String,
    pub shared: bool,
}

/// Open a capture device, retrying once with its shared variant.
///
/// The identifier is normalized and the plug form of a raw `hw:` device is
/// tried first. If that fails and a `dsnoop:` form exists, it is tried once.
pub fn open_with_fallback(opener: &dyn SourceOpener, device_id: &str) -> Result<OpenedSource, AudioError> {
    let preferred = preferred_variant(&normalize_device_id(device_id));

    let first_err = match opener.open(&preferred) {
        Ok(source) => {
            return Ok(OpenedSource {
                source,
                device: preferred,
                shared: false,
            })
        }
        Err(e) => e,
    };

    let Some(shared) = shared_variant(&preferred) else {
        return Err(AudioError::SourceUnavailable {
            device: preferred,
            fallback: None,
            reason: first_err.to_string(),
        });
    };

    tracing::warn!(
        "Opening {} failed ({}), retrying shared device {}",
        preferred,
        first_err,
        shared
    );

    match opener.open(&shared) {
        Ok(source) => Ok(OpenedSource {
            source,
            device: shared,
            shared: true,
        }),
        Err(e) => Err(AudioError::SourceUnavailable {
            device: preferred,
            fallback: Some(shared),
            reason: format!("{}; {}", first_err, e),
        }),
    }
}
