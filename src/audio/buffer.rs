//! Lock-free PCM hand-off
//!
//! Carries blocks of mono samples between a realtime cpal callback and the
//! worker thread on the other side (capture → transmit loop, mix loop →
//! playback). When the consumer falls behind, the oldest block is discarded so
//! the audio that does get through is always the most recent.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Block of mono samples at `sample_rate`
#[derive(Clone, Debug)]
pub struct PcmBlock {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Producer-assigned counter, wraps
    pub sequence: u32,
}

impl PcmBlock {
    pub fn new(samples: Vec<i16>, sample_rate: u32, sequence: u32) -> Self {
        Self {
            samples,
            sample_rate,
            sequence,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / self.sample_rate.max(1) as u64)
    }
}

/// Bounded single-producer single-consumer queue of [`PcmBlock`]s
pub struct BlockQueue {
    queue: ArrayQueue<PcmBlock>,
    displaced: AtomicU64,
}

impl BlockQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            displaced: AtomicU64::new(0),
        }
    }

    /// Shared handle for a producer/consumer pair.
    pub fn shared(capacity: usize) -> SharedBlockQueue {
        Arc::new(Self::new(capacity))
    }

    /// Enqueue a block. Returns `false` when the queue was full and the
    /// oldest block had to make room.
    pub fn push(&self, block: PcmBlock) -> bool {
        match self.queue.force_push(block) {
            None => true,
            Some(_) => {
                self.displaced.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn pop(&self) -> Option<PcmBlock> {
        self.queue.pop()
    }

    /// Append every queued sample to `out`, returning how many were added.
    pub fn drain_into(&self, out: &mut Vec<i16>) -> usize {
        let before = out.len();
        while let Some(block) = self.queue.pop() {
            out.extend_from_slice(&block.samples);
        }
        out.len() - before
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Blocks discarded because the consumer fell behind
    pub fn displaced(&self) -> u64 {
        self.displaced.load(Ordering::Relaxed)
    }
}

pub type SharedBlockQueue = Arc<BlockQueue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = BlockQueue::new(4);
        assert!(queue.push(PcmBlock::new(vec![1; 480], 48000, 0)));
        assert!(queue.push(PcmBlock::new(vec![2; 480], 48000, 1)));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().unwrap().sequence, 0);
        assert_eq!(queue.pop().unwrap().sequence, 1);
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let queue = BlockQueue::new(2);
        for seq in 0..5 {
            queue.push(PcmBlock::new(vec![seq as i16], 48000, seq));
        }
        assert_eq!(queue.displaced(), 3);

        let mut out = Vec::new();
        assert_eq!(queue.drain_into(&mut out), 2);
        assert_eq!(out, vec![3, 4]);
    }

    #[test]
    fn test_block_duration() {
        let block = PcmBlock::new(vec![0; 480], 48000, 0);
        assert_eq!(block.duration(), Duration::from_millis(10));
        let block = PcmBlock::new(vec![0; 441], 44100, 0);
        assert_eq!(block.duration(), Duration::from_millis(10));
    }
}
