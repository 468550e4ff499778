//! Upload routing by source size

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::progress::{ProgressReporter, TransferDirection};
use super::segment::FileSegment;
use super::{DEFAULT_MULTIPART_THRESHOLD, DEFAULT_THREAD_COUNT};
use crate::error::{Result, TransferError};
use crate::protocol::uri::validate_location;
use crate::protocol::{MultipartUploader, ObjectLocation, ObjectService, UploadOptions};

/// How an upload is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadRoute {
    /// One put carrying the whole source
    SingleRequest,
    Multipart,
}

impl fmt::Display for UploadRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadRoute::SingleRequest => write!(f, "single request"),
            UploadRoute::Multipart => write!(f, "multipart"),
        }
    }
}

/// Sources at or above `threshold` go multipart
pub fn route(source_size: u64, threshold: u64) -> UploadRoute {
    if source_size >= threshold {
        UploadRoute::Multipart
    } else {
        UploadRoute::SingleRequest
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub route: UploadRoute,
    pub bytes: u64,
    pub duration: Duration,
}

/// Uploads local files through a single put or a multipart uploader
#[derive(Clone)]
pub struct Uploader {
    service: Arc<dyn ObjectService>,
    multipart: Arc<dyn MultipartUploader>,
    threshold: u64,
    options: UploadOptions,
    progress: ProgressReporter,
}

impl Uploader {
    pub fn new(service: Arc<dyn ObjectService>, multipart: Arc<dyn MultipartUploader>) -> Self {
        Self {
            service,
            multipart,
            threshold: DEFAULT_MULTIPART_THRESHOLD,
            options: UploadOptions {
                part_size: None,
                concurrency: DEFAULT_THREAD_COUNT,
            },
            progress: ProgressReporter::disabled(),
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    #[tracing::instrument(skip(self), fields(source = %source.display(), location = %location))]
    pub async fn upload(&self, source: &Path, location: &ObjectLocation) -> Result<UploadReport> {
        let operation_id = location.to_string();
        match self.transfer(source, location, &operation_id).await {
            Ok(report) => {
                tracing::info!(
                    route = %report.route,
                    bytes = report.bytes,
                    duration_ms = report.duration.as_millis() as u64,
                    "upload complete"
                );
                self.progress
                    .transfer_completed(operation_id, report.bytes, report.duration);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "upload failed");
                self.progress.transfer_failed(operation_id, e.to_string());
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        source: &Path,
        location: &ObjectLocation,
        operation_id: &str,
    ) -> Result<UploadReport> {
        validate_location(location)?;
        if self.threshold == 0 {
            return Err(TransferError::InvalidConfiguration(
                "Multipart threshold must be greater than zero".to_string(),
            ));
        }

        let started = Instant::now();
        let size = tokio::fs::metadata(source).await?.len();
        let route = route(size, self.threshold);
        tracing::debug!(size, threshold = self.threshold, route = %route, "routing upload");
        self.progress.transfer_started(
            operation_id.to_string(),
            location.key.clone(),
            Some(size),
            TransferDirection::Upload,
            1,
        );

        match route {
            UploadRoute::SingleRequest => {
                let mut segment = FileSegment::new(source, 0, size);
                let body = segment.read(None).await?.unwrap_or_default();
                segment.close();
                self.service
                    .put(location, body)
                    .await
                    .map_err(|e| TransferError::remote(format!("put {}", location), e))?;
            }
            UploadRoute::Multipart => {
                self.multipart
                    .upload(source, location, &self.options)
                    .await
                    .map_err(|e| TransferError::remote(format!("multipart upload {}", location), e))?;
            }
        }

        Ok(UploadReport {
            route,
            bytes: size,
            duration: started.elapsed(),
        })
    }
}

impl fmt::Debug for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uploader")
            .field("threshold", &self.threshold)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
