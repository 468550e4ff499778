/*!
 * Remote object service boundary
 *
 * The transfer engine talks to object storage only through the traits in
 * this module:
 * - [`ObjectService`] for head/get/put style requests
 * - [`MultipartUploader`] for large uploads
 *
 * The AWS SDK backed implementation lives in [`s3`].
 */

pub mod s3;
pub mod uri;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::transfer::planner::ChunkDescriptor;
use s3::S3Result;

pub use uri::parse_s3_uri;

/// Where an object lives, resolved once at the edge of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    /// Pin every request of the transfer to one object version
    pub fn with_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)?;
        if let Some(version) = &self.version_id {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

/// Result of a HEAD-style metadata probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectProbe {
    /// Content length of the probed entity (the part, when a part was selected)
    pub content_length: u64,

    /// Number of parts the object was uploaded with, if any
    pub parts_count: Option<u32>,
}

/// What a single fetch asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    /// The whole object in one response
    Whole,

    /// One byte range or one part
    Chunk(ChunkDescriptor),
}

/// Streaming body of a fetch response
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// A fetch response, consumed exactly once by the offset writer
pub struct TransferResult {
    /// Raw `Content-Range` header, absent for whole-object responses
    pub content_range: Option<String>,

    /// Response body
    pub body: BodyReader,
}

impl TransferResult {
    pub fn new(content_range: Option<String>, body: BodyReader) -> Self {
        Self {
            content_range,
            body,
        }
    }

    /// Build a result over an in-memory body
    pub fn from_bytes(content_range: Option<String>, data: Bytes) -> Self {
        Self::new(content_range, Box::pin(std::io::Cursor::new(data)))
    }
}

impl fmt::Debug for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferResult")
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Options handed to the multipart uploader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Requested part size; planned automatically when absent
    pub part_size: Option<u64>,

    /// Number of parts uploaded concurrently
    pub concurrency: usize,
}

/// Request/response object service consumed by the transfer engine.
///
/// Signing, retries and checksums are the implementation's business.
#[async_trait]
pub trait ObjectService: Send + Sync {
    /// Fetch object metadata, optionally for a single part
    async fn probe(
        &self,
        location: &ObjectLocation,
        part_number: Option<u32>,
    ) -> S3Result<ObjectProbe>;

    /// Fetch the object, one range or one part of it
    async fn fetch(&self, location: &ObjectLocation, target: FetchTarget)
        -> S3Result<TransferResult>;

    /// Store a whole object in a single request
    async fn put(&self, location: &ObjectLocation, body: Bytes) -> S3Result<()>;
}

/// Multipart upload collaborator used above the size threshold
#[async_trait]
pub trait MultipartUploader: Send + Sync {
    async fn upload(
        &self,
        source: &Path,
        location: &ObjectLocation,
        options: &UploadOptions,
    ) -> S3Result<()>;
}
