//! Bounded worker pool that runs transfer items in join-barrier batches

use std::future::Future;
use tokio::task::JoinSet;

use super::progress::ProgressReporter;
use crate::error::{Result, TransferError};

/// Totals for one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Items that ran to completion or failure
    pub items: usize,
    pub batches: usize,
    /// Bytes reported by successful tasks
    pub bytes: u64,
}

/// Runs items through at most `concurrency` concurrent tasks.
///
/// Items are cut into consecutive batches of `concurrency`. Every task of a
/// batch is joined before the next batch starts, which bounds both open
/// connections and in-flight bodies. A failing task does not cancel its
/// siblings: the batch drains and the first failure observed is returned.
/// Work already committed by other tasks is left in place.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    progress: Option<(ProgressReporter, String)>,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(TransferError::InvalidConfiguration(
                "Thread count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            concurrency,
            progress: None,
        })
    }

    /// Emit a batch event per completed batch under `operation_id`
    pub fn with_progress(mut self, reporter: ProgressReporter, operation_id: String) -> Self {
        self.progress = Some((reporter, operation_id));
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `task` once per item. Each task resolves to the bytes it moved.
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, task: F) -> Result<PoolReport>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        let mut report = PoolReport::default();
        let mut pending = items.into_iter().peekable();

        while pending.peek().is_some() {
            let mut batch = JoinSet::new();
            for item in pending.by_ref().take(self.concurrency) {
                batch.spawn(task(item));
            }
            let batch_len = batch.len();

            let mut first_error = None;
            let mut batch_bytes = 0u64;
            while let Some(joined) = batch.join_next().await {
                let outcome = joined
                    .map_err(|e| TransferError::Worker(e.to_string()))
                    .and_then(|result| result);
                match outcome {
                    Ok(bytes) => batch_bytes += bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "transfer task failed");
                        first_error.get_or_insert(e);
                    }
                }
            }

            report.items += batch_len;
            report.batches += 1;
            report.bytes += batch_bytes;

            if let Some(e) = first_error {
                return Err(e);
            }

            tracing::debug!(
                batch = report.batches,
                items = batch_len,
                bytes = batch_bytes,
                "batch complete"
            );
            if let Some((reporter, operation_id)) = &self.progress {
                reporter.batch_completed(operation_id.clone(), report.batches, batch_len);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_batches_and_bytes() {
        let pool = WorkerPool::new(4).unwrap();
        let report = pool
            .run((1..=5u64).collect(), |n| async move { Ok(n * 10) })
            .await
            .unwrap();
        assert_eq!(
            report,
            PoolReport {
                items: 5,
                batches: 2,
                bytes: 150
            }
        );
    }

    #[tokio::test]
    async fn test_empty_input_runs_nothing() {
        let pool = WorkerPool::new(3).unwrap();
        let report = pool
            .run(Vec::<u32>::new(), |_| async { Ok(1) })
            .await
            .unwrap();
        assert_eq!(report, PoolReport::default());
    }

    #[tokio::test]
    async fn test_batch_barrier_bounds_in_flight() {
        let pool = WorkerPool::new(3).unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(Mutex::new(Vec::new()));

        pool.run((0..10usize).collect(), |i| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let finished = Arc::clone(&finished);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // Later items in a batch finish first
                tokio::time::sleep(Duration::from_millis(5 * (3 - (i % 3)) as u64)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                finished.lock().unwrap().push(i);
                Ok(0)
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        let finished = finished.lock().unwrap();
        // Every item of batch k finishes before any item of batch k+1
        for (position, item) in finished.iter().enumerate() {
            assert_eq!(item / 3, position / 3, "order was {:?}", *finished);
        }
    }

    #[tokio::test]
    async fn test_failure_drains_batch_then_stops() {
        let pool = WorkerPool::new(2).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let err = pool
            .run((0..6usize).collect(), |i| {
                let started = Arc::clone(&started);
                let completed = Arc::clone(&completed);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if i == 2 {
                        return Err(TransferError::InvalidContentRange("boom".to_string()));
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::InvalidContentRange(_)));
        // Batch two (items 2 and 3) drained; batch three never started
        assert_eq!(started.load(Ordering::SeqCst), 4);
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_worker_error() {
        let pool = WorkerPool::new(2).unwrap();
        let err = pool
            .run(vec![0u8, 1], |i| async move {
                if i == 1 {
                    panic!("task exploded");
                }
                Ok(0)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Worker(_)));
    }

    #[tokio::test]
    async fn test_batch_progress_events() {
        let (reporter, mut events) = ProgressReporter::new();
        let pool = WorkerPool::new(2)
            .unwrap()
            .with_progress(reporter, "op".to_string());
        pool.run(vec![1u64, 2, 3], |n| async move { Ok(n) })
            .await
            .unwrap();

        let mut batches = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let crate::transfer::ProgressEvent::BatchCompleted { batch, chunks, .. } =
                event
            {
                batches.push((batch, chunks));
            }
        }
        assert_eq!(batches, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(TransferError::InvalidConfiguration(_))
        ));
    }
}
