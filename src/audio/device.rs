//! Audio device identifiers and lookup
//!
//! Capture devices are addressed by ALSA-style identifiers. Loose forms
//! typed by users (`0`, `1,0`, `hw1:0`) are rewritten into the fully
//! qualified `hw:` form before opening. Opening prefers the `plughw:` form of
//! a raw `hw:` device; if that fails, the shared `dsnoop:` form of the same
//! card/device lets other consumers hold the hardware concurrently.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{StreamConfig, SupportedStreamConfig, SupportedStreamConfigRange};

use crate::constants::CANONICAL_SAMPLE_RATE;
use crate::error::AudioError;

/// Prefixes that are already fully qualified
const QUALIFIED_PREFIXES: [&str; 5] = ["hw:", "plughw:", "default", "sysdefault", "dsnoop:"];

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self { inner: device, name }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }
}

/// Rewrite a loose device identifier into its fully qualified form.
///
/// Unrecognized strings are returned unchanged (trimmed).
pub fn normalize_device_id(device: &str) -> String {
    let d = device.trim();
    if d.is_empty() || QUALIFIED_PREFIXES.iter().any(|p| d.starts_with(p)) {
        return d.to_string();
    }

    // hw0,1 / hw0:1
    if let Some(rest) = d.strip_prefix("hw") {
        if let Some((card, dev)) = split_card_device(rest) {
            return format!("hw:{},{}", card, dev);
        }
    }

    // 0
    if is_number(d) {
        return format!("hw:{}", d);
    }

    // 0,1 / 0:1
    if let Some((card, dev)) = split_card_device(d) {
        return format!("hw:{},{}", card, dev);
    }

    d.to_string()
}

/// Form tried first when opening a capture device.
pub fn preferred_variant(normalized: &str) -> String {
    match normalized.strip_prefix("hw:") {
        Some(tail) => format!("plughw:{}", tail),
        None => normalized.to_string(),
    }
}

/// Shared (`dsnoop`) variant of a device, if one exists.
pub fn shared_variant(device: &str) -> Option<String> {
    ["plughw:", "hw:", "sysdefault:"]
        .iter()
        .find_map(|prefix| device.strip_prefix(prefix))
        .map(|tail| format!("dsnoop:{}", tail))
}

fn split_card_device(s: &str) -> Option<(&str, &str)> {
    let (card, dev) = s.split_once([',', ':'])?;
    (is_number(card) && is_number(dev)).then_some((card, dev))
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Find an input device by name; empty name selects the host default.
pub fn find_input_device(name: &str) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();

    if name.is_empty() {
        return host
            .default_input_device()
            .map(AudioDevice::from_cpal)
            .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()));
    }

    host.input_devices()?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Find an output device by name; `None` selects the host default.
pub fn find_output_device(name: Option<&str>) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();

    match name {
        None | Some("") => host
            .default_output_device()
            .map(AudioDevice::from_cpal)
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .map(AudioDevice::from_cpal)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
    }
}

/// Pick the stream layout for a device.
///
/// Keeps the default channel count and runs at the canonical rate whenever a
/// supported range with that channel count covers it; otherwise the device's
/// default rate is used and callers resample.
pub fn negotiate_config(
    default: &SupportedStreamConfig,
    mut supported: impl Iterator<Item = SupportedStreamConfigRange>,
) -> StreamConfig {
    let channels = default.channels();
    let canonical = supported.any(|range| {
        range.channels() == channels
            && range.min_sample_rate().0 <= CANONICAL_SAMPLE_RATE
            && range.max_sample_rate().0 >= CANONICAL_SAMPLE_RATE
    });
    let rate = if canonical {
        CANONICAL_SAMPLE_RATE
    } else {
        default.sample_rate().0
    };

    StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(rate),
        buffer_size: cpal::BufferSize::Default,
    }
}
