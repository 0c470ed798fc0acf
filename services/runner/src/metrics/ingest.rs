//! Bounded ingest queue between the transport and the sample store.
//!
//! Producers never block: a full queue drops the sample, since the next
//! report replaces it within a second anyway. A small worker pool drains
//! the queue in batches so bursts of reporting nodes do not turn into one
//! store write per sample.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use strato_model::ActivitySample;

use super::store::SampleStore;

/// How long a worker gathers before flushing a batch.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(200);
/// Flush early once a batch reaches this size.
const MAX_BATCH: usize = 256;

/// Producer handle to the ingest queue.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<ActivitySample>,
}

impl IngestQueue {
    /// True once every worker has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Enqueue without blocking. Returns false when the sample was shed.
    pub fn offer(&self, sample: ActivitySample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(error) => {
                tracing::trace!(error = %error, "Shedding activity sample");
                false
            }
        }
    }
}

/// Spawn the worker pool. Workers flush what they hold and exit once the
/// shutdown signal flips or every producer handle is gone.
pub fn spawn_workers(
    store: Arc<dyn SampleStore>,
    workers: usize,
    buffer: usize,
    shutdown: watch::Receiver<bool>,
) -> (IngestQueue, Vec<JoinHandle<()>>) {
    let (tx, rx) = mpsc::channel(buffer);
    let rx = Arc::new(Mutex::new(rx));

    let handles = (0..workers.max(1))
        .map(|worker| {
            let store = Arc::clone(&store);
            let rx = Arc::clone(&rx);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_worker(worker, store, rx, shutdown).await;
            })
        })
        .collect();

    (IngestQueue { tx }, handles)
}

async fn run_worker(
    worker: usize,
    store: Arc<dyn SampleStore>,
    rx: Arc<Mutex<mpsc::Receiver<ActivitySample>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker, "Ingest worker started");
    loop {
        let (batch, open) = gather_batch(&rx, &mut shutdown).await;

        if !batch.is_empty() {
            if let Err(error) = store.append_batch(&batch).await {
                tracing::error!(worker, error = %error, count = batch.len(), "Failed to store sample batch");
            } else {
                tracing::trace!(worker, count = batch.len(), "Stored sample batch");
            }
        }

        if !open || *shutdown.borrow() {
            break;
        }
    }
    tracing::debug!(worker, "Ingest worker stopped");
}

/// Collect up to a flush interval's worth of samples. The second return
/// value is false once the queue is closed.
async fn gather_batch(
    rx: &Mutex<mpsc::Receiver<ActivitySample>>,
    shutdown: &mut watch::Receiver<bool>,
) -> (Vec<ActivitySample>, bool) {
    let mut rx = rx.lock().await;
    let mut batch = Vec::new();

    let window = tokio::time::sleep(FLUSH_INTERVAL);
    tokio::pin!(window);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(sample) => {
                    batch.push(sample);
                    if batch.len() >= MAX_BATCH {
                        return (batch, true);
                    }
                }
                None => return (batch, false),
            },
            _ = &mut window => return (batch, true),
            _ = shutdown.changed() => return (batch, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use strato_model::Target;

    use crate::metrics::store::MemorySampleStore;

    use super::*;

    fn sample(value: i64) -> ActivitySample {
        ActivitySample::now(&Target::new("acme", "checkout", "v1"), "node-a", value)
    }

    async fn wait_for_len(store: &MemorySampleStore, expected: usize) {
        for _ in 0..100 {
            if store.len().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("store never reached {expected} samples");
    }

    #[tokio::test]
    async fn test_offered_samples_reach_the_store() {
        let store = Arc::new(MemorySampleStore::new(Duration::from_secs(60)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, handles) = spawn_workers(Arc::clone(&store) as _, 2, 16, shutdown_rx);

        for value in 0..5 {
            assert!(queue.offer(sample(value)));
        }
        wait_for_len(&store, 5).await;

        shutdown_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_full_queue_sheds_instead_of_blocking() {
        let store = Arc::new(MemorySampleStore::new(Duration::from_secs(60)));
        // No workers draining yet: queue of 2 fills immediately.
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        let (queue, handles) = spawn_workers(Arc::clone(&store) as _, 1, 2, shutdown_rx);
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(queue.offer(sample(1)));
        assert!(queue.offer(sample(2)));
        assert!(!queue.offer(sample(3)));
    }

    #[tokio::test]
    async fn test_workers_drain_remainder_on_queue_close() {
        let store = Arc::new(MemorySampleStore::new(Duration::from_secs(60)));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, handles) = spawn_workers(Arc::clone(&store) as _, 1, 16, shutdown_rx);

        queue.offer(sample(1));
        queue.offer(sample(2));
        drop(queue);

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 2);
    }
}
