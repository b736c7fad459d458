//! Error types for the intercom

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Both the preferred device form and its shared variant (if any) failed.
    #[error("Audio source unavailable: {device}{}: {reason}", fallback_suffix(.fallback))]
    SourceUnavailable {
        device: String,
        fallback: Option<String>,
        reason: String,
    },

    #[error("cpal error: {0}")]
    CpalError(String),
}

fn fallback_suffix(fallback: &Option<String>) -> String {
    match fallback {
        Some(shared) => format!(" (shared fallback {} also failed)", shared),
        None => String::new(),
    }
}

impl From<cpal::DevicesError> for AudioError {
    fn from(e: cpal::DevicesError) -> Self {
        AudioError::CpalError(e.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        AudioError::UnsupportedFormat(e.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for AudioError {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        AudioError::UnsupportedFormat(e.to_string())
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(e: cpal::BuildStreamError) -> Self {
        AudioError::StreamError(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(e: cpal::PlayStreamError) -> Self {
        AudioError::StreamError(e.to_string())
    }
}

/// RTP packet codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Packet too short: {0} bytes")]
    TooShort(usize),

    #[error("Unsupported RTP version: {0}")]
    BadVersion(u8),

    #[error("Payload type mismatch: expected {expected}, got {actual}")]
    PayloadTypeMismatch { expected: u8, actual: u8 },

    #[error("Invalid padding length: {0}")]
    InvalidPadding(u8),

    #[error("Invalid payload type: {0}")]
    InvalidPayloadType(u8),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Failed to join multicast group {group}: {reason}")]
    JoinFailed { group: String, reason: String },

    #[error("Invalid network interface: {0}")]
    InvalidInterface(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// Session registry errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: SSRC {0}")]
    NotFound(u32),
}

/// Sink adapter errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to open sink: {0}")]
    Open(String),

    #[error("Sink write failed: {0}")]
    Write(String),

    #[error("Sink finalization failed: {0}")]
    Finalize(String),
}

impl From<hound::Error> for SinkError {
    fn from(e: hound::Error) -> Self {
        SinkError::Write(e.to_string())
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_names_both_devices() {
        let err = AudioError::SourceUnavailable {
            device: "plughw:1,0".to_string(),
            fallback: Some("dsnoop:1,0".to_string()),
            reason: "device busy".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("plughw:1,0"));
        assert!(msg.contains("dsnoop:1,0"));
        assert!(msg.contains("device busy"));
    }
}
