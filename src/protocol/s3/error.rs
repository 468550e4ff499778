//! Error types for S3 operations

use std::io;
use thiserror::Error;

/// Result type alias for S3 operations
pub type S3Result<T> = Result<T, S3Error>;

/// Errors reported by the remote object service
#[derive(Error, Debug, Clone)]
pub enum S3Error {
    /// AWS SDK error
    #[error("AWS SDK error: {0}")]
    Sdk(String),

    /// S3 service error with specific error code
    #[error("S3 service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Object not found in bucket
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket not found or not accessible
    #[error("Bucket not found or not accessible: {0}")]
    BucketNotFound(String),

    /// Access denied error
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Multipart upload error
    #[error("Multipart upload error: {0}")]
    MultipartUpload(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// One multipart part failed; names the part
    #[error("Part {part_number} failed: {source}")]
    Part {
        part_number: i32,
        #[source]
        source: Box<S3Error>,
    },
}

impl S3Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            S3Error::Network(_) => true,
            S3Error::Timeout(_) => true,
            S3Error::RateLimitExceeded(_) => true,
            S3Error::Io(_) => true,
            S3Error::Part { source, .. } => source.is_retryable(),
            // SDK errors: check for network-related strings
            S3Error::Sdk(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("connection reset")
                    || lower.contains("connection timed out")
                    || lower.contains("broken pipe")
                    || lower.contains("connection refused")
                    || lower.contains("temporarily unavailable")
            }
            S3Error::Service { code, .. } => is_retryable_code(code),
            _ => false,
        }
    }
}

impl From<io::Error> for S3Error {
    fn from(err: io::Error) -> Self {
        S3Error::Io(err.to_string())
    }
}

/// Check if an AWS error code is retryable
pub(crate) fn is_retryable_code(code: &str) -> bool {
    matches!(
        code,
        "RequestTimeout" | "ServiceUnavailable" | "InternalError" | "SlowDown"
    )
}

#[cfg(feature = "s3-native")]
impl<E> From<aws_sdk_s3::error::SdkError<E>> for S3Error
where
    E: std::error::Error + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        use aws_sdk_s3::error::SdkError;

        match error {
            SdkError::DispatchFailure(e) => {
                S3Error::Network(format!("Network dispatch failure: {:?}", e))
            }
            SdkError::TimeoutError(e) => S3Error::Timeout(format!("{:?}", e)),
            SdkError::ResponseError(e) => S3Error::Network(format!("Response error: {:?}", e)),
            SdkError::ServiceError(e) => {
                let err_str = format!("{:?}", e);
                let status = e.raw().status().as_u16();

                if err_str.contains("NoSuchBucket") {
                    S3Error::Service {
                        code: "NoSuchBucket".to_string(),
                        message: "The specified bucket does not exist".to_string(),
                    }
                } else if err_str.contains("NoSuchKey") || status == 404 {
                    S3Error::Service {
                        code: "NoSuchKey".to_string(),
                        message: "The specified key does not exist".to_string(),
                    }
                } else if err_str.contains("AccessDenied") || status == 403 {
                    S3Error::AccessDenied("Access denied to resource".to_string())
                } else if err_str.contains("SlowDown") || status == 503 {
                    S3Error::RateLimitExceeded(err_str)
                } else if status >= 500 {
                    S3Error::Service {
                        code: "InternalError".to_string(),
                        message: err_str,
                    }
                } else {
                    S3Error::Service {
                        code: "Unknown".to_string(),
                        message: err_str,
                    }
                }
            }
            _ => S3Error::Sdk(format!("{:?}", error)),
        }
    }
}
