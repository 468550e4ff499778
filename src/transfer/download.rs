//! Download driver: probe, plan, fan out, commit

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::executor::{PoolReport, WorkerPool};
use super::mode::{select_plan, TransferPlan, TransferStrategy};
use super::planner::{ChunkDescriptor, PlanLimits};
use super::progress::{ProgressReporter, TransferDirection};
use super::writer::OffsetWriter;
use super::DEFAULT_THREAD_COUNT;
use crate::config::DownloadMode;
use crate::error::{Result, TransferError};
use crate::protocol::uri::validate_location;
use crate::protocol::{FetchTarget, ObjectLocation, ObjectService};

/// One download invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub destination: PathBuf,
    pub location: ObjectLocation,
    pub mode: DownloadMode,
    /// Width of each worker pool batch
    pub thread_count: usize,
    /// Fixed chunk size; required by [`DownloadMode::GetRange`]
    pub chunk_size: Option<u64>,
}

impl TransferRequest {
    pub fn new(location: ObjectLocation, destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            location,
            mode: DownloadMode::Auto,
            thread_count: DEFAULT_THREAD_COUNT,
            chunk_size: None,
        }
    }

    pub fn with_mode(mut self, mode: DownloadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: Option<u64>) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Reject requests that cannot succeed, before any network call
    pub fn validate(&self) -> Result<()> {
        validate_location(&self.location)?;

        if self.thread_count == 0 {
            return Err(TransferError::InvalidConfiguration(
                "Thread count must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == Some(0) {
            return Err(TransferError::InvalidConfiguration(
                "Chunk size must be greater than zero".to_string(),
            ));
        }
        if self.mode == DownloadMode::GetRange && self.chunk_size.is_none() {
            return Err(TransferError::InvalidConfiguration(
                "get_range mode requires a chunk size".to_string(),
            ));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(TransferError::InvalidConfiguration(
                "Destination path is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a successful download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub strategy: TransferStrategy,
    /// Requests issued, one for a single request
    pub chunks: usize,
    pub batches: usize,
    pub bytes_written: u64,
    pub duration: Duration,
}

/// Downloads objects through an [`ObjectService`]
#[derive(Clone)]
pub struct Downloader {
    service: Arc<dyn ObjectService>,
    limits: PlanLimits,
    progress: ProgressReporter,
}

impl Downloader {
    pub fn new(service: Arc<dyn ObjectService>) -> Self {
        Self {
            service,
            limits: PlanLimits::default(),
            progress: ProgressReporter::disabled(),
        }
    }

    /// Override the service limits the planner works against
    pub fn with_limits(mut self, limits: PlanLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Download `request.location` into `request.destination`.
    ///
    /// On failure the destination keeps whatever chunks were committed and
    /// must be treated as unusable.
    #[tracing::instrument(
        skip(self, request),
        fields(location = %request.location, mode = %request.mode)
    )]
    pub async fn download(&self, request: &TransferRequest) -> Result<DownloadReport> {
        let operation_id = request.location.to_string();
        match self.transfer(request, &operation_id).await {
            Ok(report) => {
                tracing::info!(
                    strategy = %report.strategy,
                    chunks = report.chunks,
                    batches = report.batches,
                    bytes = report.bytes_written,
                    duration_ms = report.duration.as_millis() as u64,
                    "download complete"
                );
                self.progress
                    .transfer_completed(operation_id, report.bytes_written, report.duration);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, destination = %request.destination.display(), "download failed");
                self.progress.transfer_failed(operation_id, e.to_string());
                Err(e)
            }
        }
    }

    async fn transfer(&self, request: &TransferRequest, operation_id: &str) -> Result<DownloadReport> {
        request.validate()?;
        let started = Instant::now();

        let plan = select_plan(
            self.service.as_ref(),
            &request.location,
            request.mode,
            request.chunk_size,
            self.limits,
        )
        .await?;
        let descriptors = plan.descriptors();
        let chunks = descriptors.len().max(1);

        tracing::info!(
            strategy = %plan.strategy(),
            chunks,
            content_length = ?plan.content_length(),
            "starting download"
        );
        self.progress.transfer_started(
            operation_id.to_string(),
            request.location.key.clone(),
            plan.content_length(),
            TransferDirection::Download,
            chunks,
        );

        let writer = OffsetWriter::create(&request.destination, plan.content_length()).await?;
        let pool_report = match &plan {
            TransferPlan::SingleRequest { .. } => self.fetch_whole(request, &writer, operation_id).await?,
            TransferPlan::RangeFanOut { .. } | TransferPlan::PartFanOut { .. } => {
                self.fan_out(request, descriptors, &writer, operation_id)
                    .await?
            }
        };
        writer.sync().await?;

        if let Some(expected) = plan.content_length() {
            if pool_report.bytes != expected {
                return Err(TransferError::IncompleteChunk {
                    offset: 0,
                    expected,
                    actual: pool_report.bytes,
                });
            }
        }

        Ok(DownloadReport {
            strategy: plan.strategy(),
            chunks,
            batches: pool_report.batches,
            bytes_written: pool_report.bytes,
            duration: started.elapsed(),
        })
    }

    async fn fetch_whole(
        &self,
        request: &TransferRequest,
        writer: &OffsetWriter,
        operation_id: &str,
    ) -> Result<PoolReport> {
        let result = self
            .service
            .fetch(&request.location, FetchTarget::Whole)
            .await
            .map_err(|e| TransferError::remote(format!("fetch {}", request.location), e))?;
        let bytes = writer.commit(result).await?;
        self.progress
            .chunk_completed(operation_id.to_string(), 1, bytes);

        Ok(PoolReport {
            items: 1,
            batches: 1,
            bytes,
        })
    }

    async fn fan_out(
        &self,
        request: &TransferRequest,
        descriptors: Vec<ChunkDescriptor>,
        writer: &OffsetWriter,
        operation_id: &str,
    ) -> Result<PoolReport> {
        let pool = WorkerPool::new(request.thread_count)?
            .with_progress(self.progress.clone(), operation_id.to_string());
        let items: Vec<(u32, ChunkDescriptor)> = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| (index as u32 + 1, descriptor))
            .collect();

        pool.run(items, |(number, descriptor)| {
            let service = Arc::clone(&self.service);
            let location = request.location.clone();
            let writer = writer.clone();
            let progress = self.progress.clone();
            let operation_id = operation_id.to_string();
            async move {
                let result = service
                    .fetch(&location, FetchTarget::Chunk(descriptor))
                    .await
                    .map_err(|e| TransferError::remote(format!("fetch {} {}", location, descriptor), e))?;
                let bytes = writer.commit_chunk(result, descriptor).await?;
                tracing::debug!(chunk = number, %descriptor, bytes, "chunk committed");
                progress.chunk_completed(operation_id, number, bytes);
                Ok(bytes)
            }
        })
        .await
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Convenience wrapper: download one object with default limits
pub async fn download_object(
    service: Arc<dyn ObjectService>,
    location: ObjectLocation,
    destination: &Path,
) -> Result<DownloadReport> {
    let request = TransferRequest::new(location, destination);
    Downloader::new(service).download(&request).await
}
