//! Serializable query/response types exposed at the control boundary

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// One talker as seen by the receive engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub ssrc: u32,
    pub name: String,
    pub packets: u64,
    /// RMS loudness in dBFS, rounded to 0.1 dB; `None` if unknown
    pub level_db: Option<f64>,
    /// Seconds since the last datagram, rounded to 0.01 s
    pub last_seen_sec: f64,
}

/// Receive engine peers plus mix loudness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<SessionSnapshot>,
    pub mix_level_db: Option<f64>,
}

/// Aggregate traffic statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSnapshot {
    pub group: Option<String>,
    pub port: Option<u16>,
    pub iface: Option<String>,
    pub packets_total: u64,
    pub bytes_total: u64,
    pub pps_recent: f64,
    pub bps_recent: f64,
    pub last_packet_age_secs: Option<f64>,
    pub receiving: bool,
}

/// Transmit statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransmitStats {
    /// Device string actually opened, or `tone:<hz>`
    pub source: String,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
}

/// Overall node status
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub config: AppConfig,
    pub tx_running: bool,
    pub rx_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<TransmitStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_error: Option<String>,
}

/// Round to a number of decimal places for display.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(-23.456, 1), -23.5);
        assert_eq!(round_to(1.23456, 2), 1.23);
    }

    #[test]
    fn test_unknown_level_serializes_as_null() {
        let snap = SessionSnapshot {
            ssrc: 1,
            name: "SSRC 1".into(),
            packets: 0,
            level_db: None,
            last_seen_sec: 0.0,
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json["level_db"].is_null());
    }
}
