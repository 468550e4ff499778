/*!
 * Chunked transfer engine
 *
 * Downloads are planned from metadata probes and fanned out over a bounded
 * worker pool; every response is written at its own byte offset. Uploads
 * are routed by size to a single put or to a multipart uploader.
 */

pub mod download;
pub mod executor;
pub mod mode;
pub mod planner;
pub mod progress;
pub mod segment;
pub mod upload;
pub mod writer;

/// Smallest chunk worth a separate request
pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Largest number of chunks or parts a single object may be split into
pub const MAX_PARTS: u64 = 10_000;

pub const DEFAULT_THREAD_COUNT: usize = 10;

/// Uploads at or above this size go multipart
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 15 * 1024 * 1024;

pub use download::{DownloadReport, Downloader, TransferRequest};
pub use executor::{PoolReport, WorkerPool};
pub use mode::{select_plan, TransferPlan, TransferStrategy};
pub use planner::{effective_chunk_size, plan, plan_ranges, ByteRange, ChunkDescriptor, PlanLimits};
pub use progress::{ProgressEvent, ProgressReporter, TransferDirection};
pub use segment::FileSegment;
pub use upload::{route, UploadReport, UploadRoute, Uploader};
pub use writer::{ContentRange, OffsetWriter};
