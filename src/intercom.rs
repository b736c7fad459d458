//! Node controller
//!
//! Owns one receive engine, one transmitter, one traffic monitor and the
//! persisted configuration. The HTTP layer holds an `Arc<Intercom>` and
//! calls straight into it; every operation is synchronous.

use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;

use crate::config::{AppConfig, ConfigUpdate};
use crate::engine::RxEngine;
use crate::error::Result;
use crate::network::monitor::TrafficMonitor;
use crate::protocol::{NodeStatus, PeersResponse, TrafficSnapshot};
use crate::transmit::{CpalOpener, SourceOpener, Transmitter};

pub struct Intercom {
    config_path: Option<PathBuf>,
    config: RwLock<AppConfig>,
    rx: Mutex<RxEngine>,
    tx: Mutex<Transmitter>,
    monitor: Mutex<TrafficMonitor>,
    opener: Box<dyn SourceOpener + Send + Sync>,
}

impl Intercom {
    /// Controller persisting config changes to `path`.
    pub fn new(config: AppConfig, path: PathBuf) -> Self {
        Self::build(config, Some(path), Box::new(CpalOpener))
    }

    /// Controller that keeps config changes in memory only.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::build(config, None, Box::new(CpalOpener))
    }

    /// In-memory controller with a custom device opener.
    pub fn with_opener(config: AppConfig, opener: Box<dyn SourceOpener + Send + Sync>) -> Self {
        Self::build(config, None, opener)
    }

    fn build(config: AppConfig, config_path: Option<PathBuf>, opener: Box<dyn SourceOpener + Send + Sync>) -> Self {
        Self {
            config_path,
            config: RwLock::new(config),
            rx: Mutex::new(RxEngine::new()),
            tx: Mutex::new(Transmitter::new()),
            monitor: Mutex::new(TrafficMonitor::new()),
            opener,
        }
    }

    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Apply a partial update and persist it. Running engines keep their
    /// settings until restarted.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<AppConfig> {
        let mut config = self.config.write();
        let mut next = config.clone();
        next.apply_update(update);
        if let Some(path) = &self.config_path {
            next.save(path)?;
        }
        *config = next.clone();
        Ok(next)
    }

    /// (Re)start receive and the traffic monitor on the same group.
    pub fn start_rx(&self) -> Result<()> {
        let settings = self.config.read().rx_settings();
        let mut rx = self.rx.lock();
        let mut monitor = self.monitor.lock();

        monitor.stop();
        rx.start(settings.clone())?;
        if let Err(e) = monitor.start(settings.group, settings.port, settings.iface.as_deref()) {
            rx.stop();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn stop_rx(&self) {
        self.rx.lock().stop();
        self.monitor.lock().stop();
    }

    /// (Re)start transmit.
    pub fn start_tx(&self) -> Result<()> {
        let settings = self.config.read().tx_settings();
        self.tx.lock().start_with(settings, self.opener.as_ref())
    }

    pub fn stop_tx(&self) {
        self.tx.lock().stop();
    }

    /// Restart transmit, then receive.
    pub fn restart(&self) -> Result<()> {
        self.start_tx()?;
        self.start_rx()
    }

    pub fn stop_all(&self) {
        self.stop_tx();
        self.stop_rx();
    }

    pub fn status(&self) -> NodeStatus {
        let tx = self.tx.lock();
        let rx = self.rx.lock();
        let tx_running = tx.is_running();
        NodeStatus {
            config: self.config(),
            tx_running,
            rx_running: rx.is_running(),
            tx: tx_running.then(|| tx.stats()),
            rx_error: rx.last_error(),
        }
    }

    /// Active talkers and the mix loudness
    pub fn peers(&self) -> PeersResponse {
        let rx = self.rx.lock();
        PeersResponse {
            peers: rx.sessions(),
            mix_level_db: rx.mix_level(),
        }
    }

    /// Traffic monitor statistics
    pub fn metrics(&self) -> TrafficSnapshot {
        self.monitor.lock().stats()
    }

    /// Hold every engine lock for `d`, as a slow start or stop does.
    #[cfg(test)]
    pub(crate) fn hold_locks_for(&self, d: std::time::Duration) {
        let _tx = self.tx.lock();
        let _rx = self.rx.lock();
        let _monitor = self.monitor.lock();
        std::thread::sleep(d);
    }
}

impl Drop for Intercom {
    fn drop(&mut self) {
        self.stop_all();
    }
}
