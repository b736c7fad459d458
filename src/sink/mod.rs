//! Sink adapters for the mixed stream
//!
//! A sink receives a continuous stream of canonical frames (48 kHz mono
//! `i16`) from the mix loop, followed by exactly one `finish` call.

pub mod live;
pub mod wav;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::SinkError;

pub use live::LiveSink;
pub use wav::WavSink;

/// Consumer of the mixed output stream
pub trait Sink: Send {
    /// Deliver one canonical frame.
    fn write(&mut self, frame: &[i16]) -> Result<(), SinkError>;

    /// End of stream. Finalizes any container format; further writes are
    /// not expected.
    fn finish(&mut self) -> Result<(), SinkError>;
}

/// Where the mixed stream goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    /// WAV file
    #[default]
    File,
    /// Default (or named) playback device
    Live,
    /// Discard; metering only
    Null,
}

/// Sink selection for the receive engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub mode: SinkMode,
    /// Output file for [`SinkMode::File`]
    pub path: PathBuf,
    /// Playback device name for [`SinkMode::Live`]; unset = default device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::File,
            path: PathBuf::from("mix.wav"),
            device: None,
        }
    }
}

/// Discards every frame
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Sink for NullSink {
    fn write(&mut self, _frame: &[i16]) -> Result<(), SinkError> {
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Open the sink described by `config`.
pub fn open(config: &SinkConfig) -> Result<Box<dyn Sink>, SinkError> {
    match config.mode {
        SinkMode::File => Ok(Box::new(WavSink::create(&config.path)?)),
        SinkMode::Live => Ok(Box::new(LiveSink::open(config.device.as_deref())?)),
        SinkMode::Null => Ok(Box::new(NullSink::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&SinkMode::Null).unwrap();
        assert_eq!(json, "\"null\"");
        let mode: SinkMode = serde_json::from_str("\"live\"").unwrap();
        assert_eq!(mode, SinkMode::Live);
    }

    #[test]
    fn test_null_sink_counts_frames() {
        let mut sink = open(&SinkConfig {
            mode: SinkMode::Null,
            ..Default::default()
        })
        .unwrap();
        sink.write(&[0; 480]).unwrap();
        sink.finish().unwrap();
    }

    #[test]
    fn test_unwritable_file_fails_to_open() {
        let config = SinkConfig {
            mode: SinkMode::File,
            path: PathBuf::from("/nonexistent-dir/mix.wav"),
            device: None,
        };
        assert!(matches!(open(&config), Err(SinkError::Open(_))));
    }
}
