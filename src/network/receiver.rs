//! Ingest listener
//!
//! Owns the receive engine's socket. Every datagram is handed to the shared
//! [`StreamState`] under its lock; the lock is held only for parsing, the
//! session lookup and the jitter-buffer insert.

use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::constants::{RECV_BUFFER_SIZE, RECV_TIMEOUT};
use crate::engine::state::StreamState;
use crate::error::NetworkError;

/// Receive one datagram.
///
/// A read timeout is not an error: it yields `Ok(None)`.
pub fn recv_datagram(socket: &UdpSocket, buf: &mut [u8]) -> Result<Option<usize>, NetworkError> {
    match socket.recv_from(buf) {
        Ok((n, _)) => Ok(Some(n)),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
        Err(e) => Err(NetworkError::ReceiveFailed(e.to_string())),
    }
}

/// Background thread feeding datagrams into the engine state
pub struct IngestListener {
    local_addr: SocketAddr,
    thread_handle: Option<JoinHandle<()>>,
}

impl IngestListener {
    /// Start listening. The thread exits once `running` is cleared.
    pub fn spawn(
        socket: UdpSocket,
        state: Arc<Mutex<StreamState>>,
        running: Arc<AtomicBool>,
    ) -> Result<Self, NetworkError> {
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        let handle = thread::Builder::new()
            .name("rx-ingest".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; RECV_BUFFER_SIZE];
                while running.load(Ordering::Relaxed) {
                    match recv_datagram(&socket, &mut buf) {
                        Ok(Some(n)) => {
                            // Malformed datagrams are counted by the state.
                            let _ = state.lock().ingest(&buf[..n], Instant::now());
                        }
                        Ok(None) => state.lock().on_receive_timeout(),
                        Err(e) => {
                            tracing::warn!("Ingest receive error: {}", e);
                            state.lock().on_receive_timeout();
                            thread::sleep(RECV_TIMEOUT);
                        }
                    }
                }
                tracing::debug!("Ingest listener on {} exiting", local_addr);
            })
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

        Ok(Self {
            local_addr,
            thread_handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the thread to exit. The caller clears `running` first.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
