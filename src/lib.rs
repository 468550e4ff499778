/*!
 * Ferry - chunked object transfer engine
 *
 * Moves large objects between local files and S3-style object storage:
 * - Download planning from metadata probes (single request, byte-range
 *   fan-out, or reuse of the object's own multipart parts)
 * - Bounded worker pool with join-barrier batches
 * - Positioned writes, so chunks land correctly in any completion order
 * - Size-routed uploads (single put or multipart)
 * - AWS SDK backed client behind the `s3-native` feature
 */

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transfer;

// Re-export commonly used types
pub use config::{DownloadMode, LogLevel, TransferConfig};
pub use error::{Result, TransferError};
pub use protocol::{
    parse_s3_uri, FetchTarget, MultipartUploader, ObjectLocation, ObjectProbe, ObjectService,
    TransferResult, UploadOptions,
};
pub use transfer::{
    DownloadReport, Downloader, TransferRequest, UploadReport, UploadRoute, Uploader,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
