//! Receive engine
//!
//! One [`RxEngine`] owns at most one running pipeline: an ingest listener
//! thread, a cadence-driven mix thread and the sink they feed. Starting always
//! tears down the previous pipeline first, and a failed start leaves nothing
//! running.

pub mod mix_loop;
pub mod state;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::constants::*;
use crate::error::{NetworkError, Result};
use crate::network::receiver::IngestListener;
use crate::network::udp::create_receive_socket;
use crate::protocol::{SessionSnapshot, TrafficSnapshot};
use crate::sink::{self, SinkConfig};

pub use state::StreamState;

/// Parameters for one receive engine run
#[derive(Debug, Clone)]
pub struct RxSettings {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Interface name or IPv4 address to receive on
    pub iface: Option<String>,
    pub sink: SinkConfig,
    pub payload_type: u8,
    /// RTP clock rate of incoming L16 streams
    pub clock_rate: u32,
    pub jitter_latency: Duration,
    pub meter_interval: Duration,
    pub peak_ttl: Duration,
    /// Retire sessions idle this long; `None` keeps them until stop
    pub idle_timeout: Option<Duration>,
    /// SSRC to display name
    pub names: HashMap<u32, String>,
}

impl Default for RxSettings {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(239, 69, 69, 69),
            port: DEFAULT_PORT,
            iface: None,
            sink: SinkConfig::default(),
            payload_type: DEFAULT_PAYLOAD_TYPE,
            clock_rate: CANONICAL_SAMPLE_RATE,
            jitter_latency: Duration::from_millis(DEFAULT_JITTER_LATENCY_MS as u64),
            meter_interval: Duration::from_millis(DEFAULT_METER_INTERVAL_MS as u64),
            peak_ttl: Duration::from_millis(DEFAULT_PEAK_TTL_MS as u64),
            idle_timeout: None,
            names: HashMap::new(),
        }
    }
}

/// Receive engine handle
pub struct RxEngine {
    state: Option<Arc<Mutex<StreamState>>>,
    running: Arc<AtomicBool>,
    listener: Option<IngestListener>,
    mix_handle: Option<JoinHandle<()>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl RxEngine {
    pub fn new() -> Self {
        Self {
            state: None,
            running: Arc::new(AtomicBool::new(false)),
            listener: None,
            mix_handle: None,
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Start receiving. Any running pipeline is stopped first.
    ///
    /// Socket and sink are acquired before any thread starts, so errors are
    /// returned here and nothing is left running.
    pub fn start(&mut self, settings: RxSettings) -> Result<()> {
        self.stop();
        *self.last_error.lock() = None;

        let socket = create_receive_socket(
            settings.group,
            settings.port,
            settings.iface.as_deref(),
            RECV_TIMEOUT,
        )?;
        let sink = sink::open(&settings.sink)?;

        let state = Arc::new(Mutex::new(StreamState::new(&settings)));
        let running = Arc::new(AtomicBool::new(true));

        let mut listener = IngestListener::spawn(socket, state.clone(), running.clone())?;

        let mix_state = state.clone();
        let mix_running = running.clone();
        let last_error = self.last_error.clone();
        let idle_timeout = settings.idle_timeout;
        let mix_handle = thread::Builder::new()
            .name("rx-mix".to_string())
            .spawn(move || mix_loop::run(mix_state, sink, mix_running, last_error, idle_timeout));
        let mix_handle = match mix_handle {
            Ok(handle) => handle,
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                listener.join();
                return Err(NetworkError::ReceiveFailed(e.to_string()).into());
            }
        };

        tracing::info!(
            "Receive engine started on {}:{} (local {}, sink {:?})",
            settings.group,
            settings.port,
            listener.local_addr(),
            settings.sink.mode
        );

        self.state = Some(state);
        self.running = running;
        self.listener = Some(listener);
        self.mix_handle = Some(mix_handle);
        Ok(())
    }

    /// Stop the pipeline and finalize the sink. A no-op when not running.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let was_started = self.listener.is_some() || self.mix_handle.is_some();
        if let Some(mut listener) = self.listener.take() {
            listener.join();
        }
        if let Some(handle) = self.mix_handle.take() {
            let _ = handle.join();
        }
        self.state = None;

        if was_started {
            tracing::info!("Receive engine stopped");
        }
    }

    /// True while the pipeline runs. A fatal sink error clears this.
    pub fn is_running(&self) -> bool {
        self.state.is_some() && self.running.load(Ordering::SeqCst)
    }

    /// Session snapshot, sorted by name then SSRC. Empty when stopped.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.state
            .as_ref()
            .map(|s| s.lock().sessions(Instant::now()))
            .unwrap_or_default()
    }

    /// Mix loudness in dBFS; `None` when unknown or stopped
    pub fn mix_level(&self) -> Option<f64> {
        self.state.as_ref().and_then(|s| s.lock().mix_level_db())
    }

    pub fn traffic(&self) -> Option<TrafficSnapshot> {
        self.state.as_ref().map(|s| s.lock().traffic(Instant::now()))
    }

    /// Datagrams dropped as malformed since start
    pub fn malformed(&self) -> u64 {
        self.state.as_ref().map(|s| s.lock().malformed()).unwrap_or(0)
    }

    /// Reason the last run ended on its own, if it did
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr())
    }
}

impl Default for RxEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RxEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkMode;

    fn loopback() -> RxSettings {
        RxSettings {
            group: Ipv4Addr::LOCALHOST,
            port: 0,
            sink: SinkConfig {
                mode: SinkMode::Null,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut engine = RxEngine::new();
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
        assert!(engine.sessions().is_empty());
        assert_eq!(engine.mix_level(), None);
        assert!(engine.traffic().is_none());
    }

    #[test]
    fn test_failed_start_leaves_nothing_running() {
        let mut engine = RxEngine::new();
        let mut settings = loopback();
        settings.sink = SinkConfig {
            mode: SinkMode::File,
            path: "/nonexistent-dir/mix.wav".into(),
            device: None,
        };
        assert!(engine.start(settings).is_err());
        assert!(!engine.is_running());
        assert!(engine.local_addr().is_none());
    }

    #[test]
    fn test_bad_interface_fails_start() {
        let mut engine = RxEngine::new();
        let mut settings = loopback();
        settings.iface = Some("no-such-iface0".to_string());
        assert!(engine.start(settings).is_err());
        assert!(!engine.is_running());
    }

    #[test]
    fn test_restart_replaces_instance() {
        let mut engine = RxEngine::new();
        engine.start(loopback()).unwrap();
        assert!(engine.local_addr().is_some());
        engine.start(loopback()).unwrap();
        assert!(engine.is_running());
        assert!(engine.local_addr().is_some());
        engine.stop();
        assert!(!engine.is_running());
    }
}
