/*!
 * Error types for Ferry
 */

use std::io;
use thiserror::Error;

use crate::protocol::s3::S3Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Errors raised by the transfer engine
#[derive(Error, Debug)]
pub enum TransferError {
    /// Rejected before any network call was made
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A probe, fetch or put failed inside the remote collaborator
    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: S3Error,
    },

    /// Local I/O failure (destination or source file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A response carried a content-range the writer cannot place
    #[error("Invalid content range: {0}")]
    InvalidContentRange(String),

    /// The body length disagreed with its content-range
    #[error("Incomplete chunk at offset {offset}: expected {expected} bytes, got {actual}")]
    IncompleteChunk {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl TransferError {
    /// Wrap a collaborator error with the location it concerned
    pub fn remote<S: Into<String>>(context: S, source: S3Error) -> Self {
        TransferError::Remote {
            context: context.into(),
            source,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TransferError::InvalidConfiguration(_) => EXIT_FATAL,
            TransferError::Remote { source, .. } if !source.is_retryable() => EXIT_FATAL,
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if re-running the whole transfer may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Remote { source, .. } => source.is_retryable(),
            TransferError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            TransferError::IncompleteChunk { .. } | TransferError::Worker(_) => true,
            TransferError::InvalidConfiguration(_) | TransferError::InvalidContentRange(_) => false,
        }
    }
}
