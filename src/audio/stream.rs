//! Owner thread for a cpal stream
//!
//! `cpal::Stream` is not `Send` on every host, so it is built, played and
//! dropped on one dedicated thread. The caller blocks until the driver has
//! either started the stream or refused it.

use cpal::traits::StreamTrait;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the driver gets to confirm the stream is running
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

const PARK_INTERVAL: Duration = Duration::from_millis(10);

pub struct StreamThread {
    name: String,
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Spawn `name`, run `build` on it and start the resulting stream.
    ///
    /// Returns once the stream is playing. Any failure (build, play, thread
    /// death or the driver never answering) comes back as a message and
    /// leaves no thread behind.
    pub fn spawn<F>(name: &str, build: F) -> Result<Self, String>
    where
        F: FnOnce() -> Result<cpal::Stream, String> + Send + 'static,
    {
        let alive = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let keep_alive = alive.clone();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|s| s.play().map(|_| s).map_err(|e| e.to_string())) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while keep_alive.load(Ordering::Relaxed) {
                    thread::sleep(PARK_INTERVAL);
                }
                drop(stream);
            })
            .map_err(|e| e.to_string())?;

        let mut owner = Self {
            name: name.to_string(),
            alive,
            handle: Some(handle),
        };

        let started = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(format!("not started within {:?}", OPEN_TIMEOUT)),
            Err(RecvTimeoutError::Disconnected) => Err(format!("{} thread exited", owner.name)),
        };
        if let Err(e) = started {
            owner.stop();
            return Err(e);
        }
        Ok(owner)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.alive.load(Ordering::SeqCst)
    }

    /// Drop the stream and join its thread. Idempotent.
    pub fn stop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failure_is_reported() {
        let err = StreamThread::spawn("stream-test", || Err("no such device".to_string()))
            .err()
            .unwrap();
        assert_eq!(err, "no such device");
    }

    #[test]
    fn test_thread_death_is_reported() {
        let err = StreamThread::spawn("stream-panic", || panic!("driver crashed"))
            .err()
            .unwrap();
        assert!(err.contains("stream-panic"));
    }
}
