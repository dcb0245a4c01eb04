//! Frame Source Plumbing
//!
//! Bounds the rate at which recognition results reach the session
//! coordinator. Only one in every `stride` captured frames is recognized at
//! all, and a busy consumer only ever sees the most recent pending batch.

pub mod frame;

pub use frame::RecognitionBatch;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::debug;

/// Forwards one of every `stride` captured frames
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    stride: u32,
    counter: u64,
}

impl FrameThrottle {
    /// A stride of 0 is treated as 1 (forward everything)
    pub fn new(stride: u32) -> Self {
        Self {
            stride: stride.max(1),
            counter: 0,
        }
    }

    /// Count a captured frame and report whether it should be recognized
    pub fn admit(&mut self) -> bool {
        self.counter += 1;
        self.counter % u64::from(self.stride) == 0
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Frames counted so far
    pub fn frames_seen(&self) -> u64 {
        self.counter
    }
}

/// Single-slot mailbox that keeps only the newest batch
///
/// Publishing never blocks; a batch the consumer has not picked up yet is
/// replaced by the next one.
#[derive(Debug, Default)]
pub struct LatestBatchSlot {
    slot: Mutex<Option<RecognitionBatch>>,
    notify: Notify,
    closed: AtomicBool,
    replaced: AtomicU64,
}

impl LatestBatchSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `batch`, replacing any batch still pending
    ///
    /// Returns false once the slot has been closed.
    pub fn publish(&self, batch: RecognitionBatch) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let previous = self.slot.lock().replace(batch);
        if previous.is_some() {
            let replaced = self.replaced.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Consumer busy, dropped stale batch ({} so far)", replaced);
        }
        self.notify.notify_one();
        true
    }

    /// Take the pending batch without waiting
    pub fn try_take(&self) -> Option<RecognitionBatch> {
        self.slot.lock().take()
    }

    /// Wait for the next batch; `None` once closed and drained
    pub async fn next(&self) -> Option<RecognitionBatch> {
        loop {
            if let Some(batch) = self.try_take() {
                return Some(batch);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting batches and wake the consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of batches overwritten before the consumer saw them
    pub fn replaced_count(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }
}
