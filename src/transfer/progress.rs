//! Progress events for transfers
//!
//! Transfers report through a [`ProgressReporter`], which forwards typed
//! events over an unbounded tokio channel. Sending never blocks and never
//! fails the transfer: once the receiver is dropped, events are discarded.
//!
//! ```no_run
//! use ferry::transfer::progress::{ProgressEvent, ProgressReporter};
//!
//! # async fn demo() {
//! let (reporter, mut receiver) = ProgressReporter::new();
//! tokio::spawn(async move {
//!     while let Some(event) = receiver.recv().await {
//!         if let ProgressEvent::ChunkCompleted { chunk_bytes, .. } = event {
//!             println!("+{} bytes", chunk_bytes);
//!         }
//!     }
//! });
//! # let _ = reporter;
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Progress event for a transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressEvent {
    TransferStarted {
        operation_id: String,
        /// Object the transfer reads or writes
        key: String,
        /// `None` when no probe ran before the transfer
        total_bytes: Option<u64>,
        direction: TransferDirection,
        /// Work items the transfer was split into
        chunks: usize,
    },

    /// One chunk or part committed
    ChunkCompleted {
        operation_id: String,
        /// 1-based position in the plan
        chunk_number: u32,
        chunk_bytes: u64,
    },

    /// A worker pool batch joined without failures
    BatchCompleted {
        operation_id: String,
        /// 1-based batch index
        batch: usize,
        chunks: usize,
    },

    TransferCompleted {
        operation_id: String,
        total_bytes: u64,
        duration: Duration,
    },

    TransferFailed {
        operation_id: String,
        error: String,
    },
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "Upload"),
            TransferDirection::Download => write!(f, "Download"),
        }
    }
}

/// Cloneable sending half for progress events
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: Arc<UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    /// A reporter nobody listens to
    pub fn disabled() -> Self {
        let (sender, _) = unbounded_channel();
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn report(&self, event: ProgressEvent) {
        // Receiver may be gone
        let _ = self.sender.send(event);
    }

    pub fn transfer_started(
        &self,
        operation_id: String,
        key: String,
        total_bytes: Option<u64>,
        direction: TransferDirection,
        chunks: usize,
    ) {
        self.report(ProgressEvent::TransferStarted {
            operation_id,
            key,
            total_bytes,
            direction,
            chunks,
        });
    }

    pub fn chunk_completed(&self, operation_id: String, chunk_number: u32, chunk_bytes: u64) {
        self.report(ProgressEvent::ChunkCompleted {
            operation_id,
            chunk_number,
            chunk_bytes,
        });
    }

    pub fn batch_completed(&self, operation_id: String, batch: usize, chunks: usize) {
        self.report(ProgressEvent::BatchCompleted {
            operation_id,
            batch,
            chunks,
        });
    }

    pub fn transfer_completed(&self, operation_id: String, total_bytes: u64, duration: Duration) {
        self.report(ProgressEvent::TransferCompleted {
            operation_id,
            total_bytes,
            duration,
        });
    }

    pub fn transfer_failed(&self, operation_id: String, error: String) {
        self.report(ProgressEvent::TransferFailed {
            operation_id,
            error,
        });
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Average rate in MiB/s, zero for an empty duration
pub fn throughput_mibps(bytes: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs / 1_048_576.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_reporter() {
        let (reporter, mut receiver) = ProgressReporter::new();

        reporter.transfer_started(
            "op1".to_string(),
            "test.txt".to_string(),
            Some(1000),
            TransferDirection::Download,
            3,
        );

        match receiver.recv().await.unwrap() {
            ProgressEvent::TransferStarted {
                operation_id,
                total_bytes,
                chunks,
                ..
            } => {
                assert_eq!(operation_id, "op1");
                assert_eq!(total_bytes, Some(1000));
                assert_eq!(chunks, 3);
            }
            other => panic!("Expected TransferStarted event, got {:?}", other),
        }
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (reporter, receiver) = ProgressReporter::new();
        drop(receiver);
        reporter.chunk_completed("op".to_string(), 1, 10);
        ProgressReporter::disabled().transfer_failed("op".to_string(), "boom".to_string());
    }

    #[test]
    fn test_throughput() {
        assert_eq!(throughput_mibps(10_485_760, Duration::from_secs(10)), 1.0);
        assert_eq!(throughput_mibps(100, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_transfer_direction_display() {
        assert_eq!(TransferDirection::Upload.to_string(), "Upload");
        assert_eq!(TransferDirection::Download.to_string(), "Download");
    }
}
