//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod jitter;
pub mod level;
pub mod mixer;
pub mod normalize;
pub mod stream;
pub mod tone;

pub use buffer::{BlockQueue, PcmBlock};
pub use capture::AudioCapture;
pub use device::{normalize_device_id, AudioDevice};
pub use jitter::{JitterBuffer, JitterConfig};
pub use level::{LevelConfig, LevelMeter};
pub use mixer::{MixedFrame, Mixer};
pub use tone::ToneGenerator;
