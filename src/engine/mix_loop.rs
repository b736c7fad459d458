//! Cadence-driven mix thread
//!
//! The mix clock is the single timing authority downstream of the jitter
//! buffers: every period it renders one frame from each session, mixes, meters
//! and hands the result to the sink. The state lock is released before the
//! sink write.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::mixer::Mixer;
use crate::constants::{MIX_FRAME_MS, MIX_FRAME_SAMPLES};
use crate::engine::state::StreamState;
use crate::sink::Sink;

/// Ticks the loop may fall behind before it stops catching up
const MAX_LAG_TICKS: u32 = 10;

pub(crate) fn run(
    state: Arc<Mutex<StreamState>>,
    mut sink: Box<dyn Sink>,
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    idle_timeout: Option<Duration>,
) {
    let period = Duration::from_millis(MIX_FRAME_MS as u64);
    let mut mixer = Mixer::new(MIX_FRAME_SAMPLES);
    let mut next_tick = Instant::now() + period;

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next_tick {
            thread::sleep(next_tick - now);
        } else if now - next_tick > period * MAX_LAG_TICKS {
            tracing::warn!("Mix loop fell {:?} behind, skipping ahead", now - next_tick);
            next_tick = now;
        }
        next_tick += period;

        let frame = {
            let mut state = state.lock();
            if let Some(timeout) = idle_timeout {
                state.evict_idle(Instant::now(), timeout);
            }
            state.mix_next_frame(&mut mixer)
        };

        if let Err(e) = sink.write(&frame.samples) {
            tracing::error!("Sink write failed, stopping receive engine: {}", e);
            if let Err(fin) = sink.finish() {
                tracing::warn!("Sink finalization after write failure also failed: {}", fin);
            }
            *last_error.lock() = Some(e.to_string());
            running.store(false, Ordering::SeqCst);
            return;
        }
    }

    if let Err(e) = sink.finish() {
        tracing::error!("Sink finalization failed: {}", e);
        *last_error.lock() = Some(e.to_string());
    }
    let stats = mixer.stats();
    tracing::debug!(
        "Mix loop exiting: {} frames mixed, {} samples clipped",
        stats.frames_mixed,
        stats.clipped_samples
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RxSettings;
    use crate::error::SinkError;

    struct FailingSink {
        writes: Arc<Mutex<u32>>,
        finished: Arc<AtomicBool>,
    }

    impl Sink for FailingSink {
        fn write(&mut self, _frame: &[i16]) -> Result<(), SinkError> {
            let mut writes = self.writes.lock();
            *writes += 1;
            if *writes >= 3 {
                return Err(SinkError::Write("disk full".to_string()));
            }
            Ok(())
        }

        fn finish(&mut self) -> Result<(), SinkError> {
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_finalizes_and_stops() {
        let state = Arc::new(Mutex::new(StreamState::new(&RxSettings::default())));
        let writes = Arc::new(Mutex::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let sink = Box::new(FailingSink {
            writes: writes.clone(),
            finished: finished.clone(),
        });
        let running = Arc::new(AtomicBool::new(true));
        let last_error = Arc::new(Mutex::new(None));

        run(state, sink, running.clone(), last_error.clone(), None);

        assert_eq!(*writes.lock(), 3);
        assert!(finished.load(Ordering::SeqCst));
        assert!(!running.load(Ordering::SeqCst));
        assert!(last_error.lock().as_deref().unwrap().contains("disk full"));
    }

    #[test]
    fn test_stop_signal_finishes_sink() {
        let state = Arc::new(Mutex::new(StreamState::new(&RxSettings::default())));
        let finished = Arc::new(AtomicBool::new(false));
        let sink = Box::new(FailingSink {
            writes: Arc::new(Mutex::new(0)),
            finished: finished.clone(),
        });
        let running = Arc::new(AtomicBool::new(false));

        run(state, sink, running, Arc::new(Mutex::new(None)), None);
        assert!(finished.load(Ordering::SeqCst));
    }
}
