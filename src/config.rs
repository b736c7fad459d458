//! Node configuration
//!
//! Persisted as TOML. Missing files and missing keys fall back to defaults,
//! so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::engine::RxSettings;
use crate::error::{Error, Result};
use crate::sink::SinkConfig;
use crate::transmit::{SourceKind, TxSettings};

const MIN_TONE_HZ: i64 = 20;
const MAX_TONE_HZ: i64 = 20_000;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub tx: TxConfig,
    pub rx: RxConfig,
    pub ui: UiConfig,
    /// Decimal SSRC to display name
    pub ssrc_names: BTreeMap<String, String>,
}

/// Settings shared by transmit and receive
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface name (`eth0`) or IPv4 address; used when TX/RX set none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
}

/// Transmit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    pub source: SourceKind,
    pub tone_frequency: u32,
    /// Capture device; blank = default input
    pub device: String,
    /// This unit's display name
    pub name: String,
    pub ssrc: u32,
    pub group: Ipv4Addr,
    pub port: u16,
    pub ttl: u32,
    pub packet_ms: u32,
    pub payload_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<Ipv4Addr>,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Tone,
            tone_frequency: DEFAULT_TONE_HZ,
            device: String::new(),
            name: "Unit A".to_string(),
            ssrc: DEFAULT_SSRC,
            group: Ipv4Addr::new(239, 69, 69, 69),
            port: DEFAULT_PORT,
            ttl: DEFAULT_TTL,
            packet_ms: DEFAULT_PACKET_MS,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            iface: None,
            bind_address: None,
        }
    }
}

/// Receive configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub jitter_latency_ms: u32,
    pub meter_interval_ms: u32,
    pub peak_ttl_ms: u32,
    /// Retire talkers silent this long; unset keeps them until RX stops
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
    pub sink: SinkConfig,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(239, 69, 69, 69),
            port: DEFAULT_PORT,
            iface: None,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            clock_rate: CANONICAL_SAMPLE_RATE,
            jitter_latency_ms: DEFAULT_JITTER_LATENCY_MS,
            meter_interval_ms: DEFAULT_METER_INTERVAL_MS,
            peak_ttl_ms: DEFAULT_PEAK_TTL_MS,
            idle_timeout_secs: None,
            sink: SinkConfig::default(),
        }
    }
}

/// Control API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let ssrc_names = BTreeMap::from([
            ("12345678".to_string(), "Unit A".to_string()),
            ("23456789".to_string(), "Unit B".to_string()),
        ]);
        Self {
            network: NetworkConfig::default(),
            tx: TxConfig::default(),
            rx: RxConfig::default(),
            ui: UiConfig::default(),
            ssrc_names,
        }
    }
}

/// Partial update posted by the control API
///
/// Numeric fields are wide so out-of-range input can be clamped rather
/// than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub iface: Option<String>,
    pub tx_source: Option<SourceKind>,
    pub tx_tone_frequency: Option<i64>,
    pub tx_device: Option<String>,
    pub tx_name: Option<String>,
    pub tx_ssrc: Option<i64>,
    pub tx_group: Option<Ipv4Addr>,
    pub tx_port: Option<u16>,
    pub tx_ttl: Option<u32>,
    pub tx_packet_ms: Option<u32>,
    pub rx_group: Option<Ipv4Addr>,
    pub rx_port: Option<u16>,
    pub rx_sink: Option<SinkConfig>,
    pub rx_jitter_latency_ms: Option<u32>,
    pub rx_idle_timeout_secs: Option<u64>,
    pub ssrc_names: Option<BTreeMap<String, String>>,
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write to `path` via a temporary file and an atomic rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Per-user config file, or `./intercom.toml` when no home is known.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "partyline-intercom")
            .map(|dirs| dirs.config_dir().join("intercom.toml"))
            .unwrap_or_else(|| PathBuf::from("intercom.toml"))
    }

    /// Apply a partial update.
    ///
    /// The tone frequency is clamped to 20..=20000 Hz and the SSRC masked to
    /// 32 bits. This unit's name is always recorded in the SSRC name table.
    pub fn apply_update(&mut self, update: ConfigUpdate) {
        if let Some(iface) = update.iface {
            let iface = iface.trim();
            self.network.iface = (!iface.is_empty()).then(|| iface.to_string());
        }
        if let Some(names) = update.ssrc_names {
            self.ssrc_names = names;
        }

        let tx = &mut self.tx;
        if let Some(source) = update.tx_source {
            tx.source = source;
        }
        if let Some(hz) = update.tx_tone_frequency {
            tx.tone_frequency = hz.clamp(MIN_TONE_HZ, MAX_TONE_HZ) as u32;
        }
        if let Some(device) = update.tx_device {
            tx.device = device.trim().to_string();
        }
        if let Some(name) = update.tx_name {
            tx.name = name.trim().to_string();
        }
        if let Some(ssrc) = update.tx_ssrc {
            tx.ssrc = (ssrc & 0xFFFF_FFFF) as u32;
        }
        if let Some(group) = update.tx_group {
            tx.group = group;
        }
        if let Some(port) = update.tx_port {
            tx.port = port;
        }
        if let Some(ttl) = update.tx_ttl {
            tx.ttl = ttl;
        }
        if let Some(ms) = update.tx_packet_ms {
            tx.packet_ms = ms;
        }

        let rx = &mut self.rx;
        if let Some(group) = update.rx_group {
            rx.group = group;
        }
        if let Some(port) = update.rx_port {
            rx.port = port;
        }
        if let Some(sink) = update.rx_sink {
            rx.sink = sink;
        }
        if let Some(ms) = update.rx_jitter_latency_ms {
            rx.jitter_latency_ms = ms;
        }
        if let Some(secs) = update.rx_idle_timeout_secs {
            rx.idle_timeout_secs = (secs > 0).then_some(secs);
        }

        let name = if self.tx.name.is_empty() {
            format!("SSRC {}", self.tx.ssrc)
        } else {
            self.tx.name.clone()
        };
        self.ssrc_names.insert(self.tx.ssrc.to_string(), name);
    }

    /// SSRC name table keyed by number. Keys that are not valid SSRCs are
    /// skipped.
    pub fn ssrc_name_table(&self) -> HashMap<u32, String> {
        self.ssrc_names
            .iter()
            .filter_map(|(key, name)| match key.trim().parse::<u32>() {
                Ok(ssrc) => Some((ssrc, name.clone())),
                Err(_) => {
                    tracing::warn!("Ignoring SSRC name entry with invalid key {:?}", key);
                    None
                }
            })
            .collect()
    }

    fn iface_for(&self, own: &Option<String>) -> Option<String> {
        own.clone()
            .or_else(|| self.network.iface.clone())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn rx_settings(&self) -> RxSettings {
        let rx = &self.rx;
        RxSettings {
            group: rx.group,
            port: rx.port,
            iface: self.iface_for(&rx.iface),
            sink: rx.sink.clone(),
            payload_type: rx.payload_type,
            clock_rate: rx.clock_rate,
            jitter_latency: Duration::from_millis(rx.jitter_latency_ms as u64),
            meter_interval: Duration::from_millis(rx.meter_interval_ms as u64),
            peak_ttl: Duration::from_millis(rx.peak_ttl_ms as u64),
            idle_timeout: rx.idle_timeout_secs.map(Duration::from_secs),
            names: self.ssrc_name_table(),
        }
    }

    pub fn tx_settings(&self) -> TxSettings {
        let tx = &self.tx;
        TxSettings {
            group: tx.group,
            port: tx.port,
            ttl: tx.ttl,
            iface: self.iface_for(&tx.iface),
            bind_address: tx.bind_address,
            source: tx.source,
            tone_frequency: tx.tone_frequency,
            device: tx.device.clone(),
            ssrc: tx.ssrc,
            payload_type: tx.payload_type,
            packet_ms: tx.packet_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkMode;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.tx.group.to_string(), "239.69.69.69");
        assert_eq!(config.ui.http_port, 8080);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("intercom.toml");

        let mut config = AppConfig::default();
        config.network.iface = Some("eth0".to_string());
        config.rx.sink.mode = SinkMode::Null;
        config.rx.idle_timeout_secs = Some(30);
        config.save(&path).unwrap();

        assert!(!path.with_extension("toml.tmp").exists());
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intercom.toml");
        std::fs::write(&path, "[tx]\nname = \"Stage\"\nport = 6000\n\n[rx.sink]\nmode = \"live\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.tx.name, "Stage");
        assert_eq!(config.tx.port, 6000);
        assert_eq!(config.tx.ssrc, 12_345_678);
        assert_eq!(config.rx.sink.mode, SinkMode::Live);
        assert_eq!(config.rx.sink.path, PathBuf::from("mix.wav"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intercom.toml");
        std::fs::write(&path, "[tx\nport = ").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_update_clamps_and_records_name() {
        let mut config = AppConfig::default();
        config.apply_update(ConfigUpdate {
            tx_tone_frequency: Some(5),
            tx_ssrc: Some(0x1_0000_0007),
            tx_name: Some("  Booth ".to_string()),
            ..Default::default()
        });
        assert_eq!(config.tx.tone_frequency, 20);
        assert_eq!(config.tx.ssrc, 7);
        assert_eq!(config.ssrc_names.get("7").map(String::as_str), Some("Booth"));

        config.apply_update(ConfigUpdate {
            tx_tone_frequency: Some(99_999),
            tx_name: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(config.tx.tone_frequency, 20_000);
        assert_eq!(config.ssrc_names.get("7").map(String::as_str), Some("SSRC 7"));
    }

    #[test]
    fn test_update_from_json() {
        let update: ConfigUpdate =
            serde_json::from_str(r#"{"iface": "", "tx_source": "device", "rx_sink": {"mode": "null"}}"#).unwrap();
        let mut config = AppConfig::default();
        config.network.iface = Some("eth0".to_string());
        config.apply_update(update);
        assert_eq!(config.network.iface, None);
        assert_eq!(config.tx.source, SourceKind::Device);
        assert_eq!(config.rx.sink.mode, SinkMode::Null);
        assert_eq!(config.rx.sink.path, PathBuf::from("mix.wav"));
    }

    #[test]
    fn test_name_table_skips_bad_keys() {
        let mut config = AppConfig::default();
        config.ssrc_names.insert("not-a-number".to_string(), "Ghost".to_string());
        let table = config.ssrc_name_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&23_456_789).map(String::as_str), Some("Unit B"));
    }

    #[test]
    fn test_shared_iface_applies_to_both_paths() {
        let mut config = AppConfig::default();
        config.network.iface = Some("eth0".to_string());
        config.tx.iface = Some("192.168.1.20".to_string());
        assert_eq!(config.tx_settings().iface.as_deref(), Some("192.168.1.20"));
        assert_eq!(config.rx_settings().iface.as_deref(), Some("eth0"));
        assert_eq!(config.rx_settings().names.len(), 2);
    }
}
