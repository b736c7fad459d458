//! Traffic monitor
//!
//! A lightweight multicast listener that only counts datagrams. It owns its
//! own socket, thread and lock and shares nothing with the mixing engine, so
//! it can run for diagnostics while the engine is stopped.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::constants::{RECV_BUFFER_SIZE, RECV_TIMEOUT};
use crate::error::NetworkError;
use crate::network::receiver::recv_datagram;
use crate::network::udp::create_receive_socket;
use crate::protocol::TrafficSnapshot;

/// Sliding window length for rate estimation
pub const RATE_WINDOW: Duration = Duration::from_secs(2);

/// A packet within this long counts as "receiving"
pub const RECEIVING_THRESHOLD: Duration = Duration::from_millis(2500);

/// Multiplier applied to both rates on every idle receive timeout
pub const IDLE_DECAY: f64 = 0.9;

/// Lower bound on the rate denominator so a lone packet does not read as
/// an enormous rate
const MIN_RATE_ELAPSED: f64 = 1.0;

/// Sliding-window packet/byte rate estimator
#[derive(Debug, Clone, Default)]
pub struct TrafficWindow {
    window: VecDeque<(Instant, usize)>,
    window_bytes: usize,
    packets_total: u64,
    bytes_total: u64,
    last_packet: Option<Instant>,
    pps: f64,
    bps: f64,
}

impl TrafficWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one datagram of `bytes` arriving at `now`.
    pub fn record(&mut self, now: Instant, bytes: usize) {
        self.packets_total += 1;
        self.bytes_total += bytes as u64;
        self.last_packet = Some(now);

        self.window.push_back((now, bytes));
        self.window_bytes += bytes;
        while let Some(&(ts, n)) = self.window.front() {
            if now.duration_since(ts) > RATE_WINDOW {
                self.window.pop_front();
                self.window_bytes -= n;
            } else {
                break;
            }
        }

        let first = self.window.front().map(|&(ts, _)| ts).unwrap_or(now);
        let elapsed = now.duration_since(first).as_secs_f64().max(MIN_RATE_ELAPSED);
        self.pps = self.window.len() as f64 / elapsed;
        self.bps = self.window_bytes as f64 / elapsed;
    }

    /// Fade both rates after a receive timeout.
    pub fn decay(&mut self) {
        self.pps *= IDLE_DECAY;
        self.bps *= IDLE_DECAY;
    }

    pub fn packets_total(&self) -> u64 {
        self.packets_total
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    pub fn pps(&self) -> f64 {
        self.pps
    }

    pub fn bps(&self) -> f64 {
        self.bps
    }

    pub fn last_packet(&self) -> Option<Instant> {
        self.last_packet
    }

    pub fn is_receiving(&self, now: Instant) -> bool {
        self.last_packet
            .map(|ts| now.saturating_duration_since(ts) < RECEIVING_THRESHOLD)
            .unwrap_or(false)
    }

    pub fn snapshot(&self, now: Instant) -> TrafficSnapshot {
        TrafficSnapshot {
            group: None,
            port: None,
            iface: None,
            packets_total: self.packets_total,
            bytes_total: self.bytes_total,
            pps_recent: self.pps,
            bps_recent: self.bps,
            last_packet_age_secs: self
                .last_packet
                .map(|ts| now.saturating_duration_since(ts).as_secs_f64()),
            receiving: self.is_receiving(now),
        }
    }
}

#[derive(Debug, Clone)]
struct Target {
    group: Ipv4Addr,
    port: u16,
    iface: Option<String>,
}

#[derive(Default)]
struct MonitorShared {
    target: Option<Target>,
    window: TrafficWindow,
}

/// Independent multicast traffic listener
pub struct TrafficMonitor {
    shared: Arc<Mutex<MonitorShared>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl TrafficMonitor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(MonitorShared::default())),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// (Re)start monitoring `group:port`. Any previous listener is stopped first.
    pub fn start(&mut self, group: Ipv4Addr, port: u16, iface: Option<&str>) -> Result<(), NetworkError> {
        self.stop();

        let socket = create_receive_socket(group, port, iface, RECV_TIMEOUT)?;

        {
            let mut shared = self.shared.lock();
            shared.target = Some(Target {
                group,
                port,
                iface: iface.map(str::to_string),
            });
            shared.window = TrafficWindow::new();
        }

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let shared = self.shared.clone();

        let handle = thread::Builder::new()
            .name("traffic-monitor".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; RECV_BUFFER_SIZE];
                while running.load(Ordering::Relaxed) {
                    match recv_datagram(&socket, &mut buf) {
                        Ok(Some(n)) => shared.lock().window.record(Instant::now(), n),
                        Ok(None) => shared.lock().window.decay(),
                        Err(e) => {
                            tracing::warn!("Traffic monitor receive error: {}", e);
                            shared.lock().window.decay();
                            thread::sleep(RECV_TIMEOUT);
                        }
                    }
                }
                // Socket is dropped here, leaving the group
            })
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

        self.thread_handle = Some(handle);
        tracing::info!("Traffic monitor listening on {}:{}", group, port);
        Ok(())
    }

    /// Stop listening. Safe to call when not running.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Traffic monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Point-in-time traffic statistics
    pub fn stats(&self) -> TrafficSnapshot {
        let shared = self.shared.lock();
        let mut snapshot = shared.window.snapshot(Instant::now());
        if let Some(target) = &shared.target {
            snapshot.group = Some(target.group.to_string());
            snapshot.port = Some(target.port);
            snapshot.iface = target.iface.clone();
        }
        snapshot
    }
}

impl Default for TrafficMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrafficMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
