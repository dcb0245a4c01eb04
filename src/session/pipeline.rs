//! Background worker feeding the coordinator from the frame source

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::capture::{LatestBatchSlot, RecognitionBatch};
use crate::session::coordinator::SessionCoordinator;

/// Single consumer draining the latest-batch slot into a coordinator
pub struct ScanPipeline {
    slot: Arc<LatestBatchSlot>,
    coordinator: SessionCoordinator,
    worker: JoinHandle<u64>,
}

impl ScanPipeline {
    /// Spawn the consumer on the current tokio runtime
    pub fn spawn(coordinator: SessionCoordinator) -> Self {
        let slot = Arc::new(LatestBatchSlot::new());
        let worker = {
            let slot = slot.clone();
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let mut processed = 0u64;
                while let Some(batch) = slot.next().await {
                    let outcome = coordinator.on_batch(batch);
                    debug!("Batch outcome: {:?}", outcome);
                    processed += 1;
                }
                processed
            })
        };
        info!("Scan pipeline started");
        Self {
            slot,
            coordinator,
            worker,
        }
    }

    /// Hand a batch to the worker; replaces one it has not picked up yet
    pub fn publish(&self, batch: RecognitionBatch) -> bool {
        self.slot.publish(batch)
    }

    /// Slot shared with frame-source threads
    pub fn slot(&self) -> Arc<LatestBatchSlot> {
        self.slot.clone()
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    /// Stop the worker and cancel outstanding timers
    ///
    /// Returns the number of batches the worker processed.
    pub async fn shutdown(self) -> u64 {
        self.slot.close();
        let processed = self.worker.await.unwrap_or_default();
        self.coordinator.shutdown();
        info!(
            "Scan pipeline stopped after {} batches ({} dropped as stale)",
            processed,
            self.slot.replaced_count()
        );
        processed
    }
}
