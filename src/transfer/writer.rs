//! Offset-addressed commits of fetch results into the destination file

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::planner::ChunkDescriptor;
use crate::error::{Result, TransferError};
use crate::protocol::{BodyReader, TransferResult};

/// Body bytes buffered before each positioned write
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Position of a response body within the object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    /// Inclusive end
    pub end: u64,
    /// Complete object length, `None` for `*`
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parse `bytes <start>-<end>/<total|*>`
    pub fn parse(header: &str) -> Result<Self> {
        let invalid = || TransferError::InvalidContentRange(header.to_string());

        let rest = header.trim().strip_prefix("bytes").ok_or_else(invalid)?;
        let rest = rest.trim_start_matches([' ', '=']);
        let (range, total) = rest.split_once('/').ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;

        let start: u64 = start.trim().parse().map_err(|_| invalid())?;
        let end: u64 = end.trim().parse().map_err(|_| invalid())?;
        if end < start {
            return Err(invalid());
        }

        let total = match total.trim() {
            "*" => None,
            value => Some(value.parse::<u64>().map_err(|_| invalid())?),
        };
        if total.is_some_and(|total| end >= total) {
            return Err(invalid());
        }

        Ok(Self {
            start,
            end,
            total,
        })
    }

    /// Body length the range announces
    pub fn expected_len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Writes fetch results into one destination file at their object offsets.
///
/// The handle is shared by every writer task. Concurrent commits target
/// disjoint spans and use positioned writes, so no lock is taken. A commit
/// never writes outside the span its content-range announces.
#[derive(Debug, Clone)]
pub struct OffsetWriter {
    path: PathBuf,
    file: Arc<File>,
}

impl OffsetWriter {
    /// Create (or truncate) the destination, pre-sized when the length is known
    pub async fn create(path: &Path, content_length: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let owned = path.to_path_buf();
        let file = tokio::task::spawn_blocking(move || -> io::Result<File> {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&owned)?;
            if let Some(len) = content_length {
                file.set_len(len)?;
            }
            Ok(file)
        })
        .await
        .map_err(|e| TransferError::Worker(format!("open {}: {}", path.display(), e)))??;

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a whole-object result.
    ///
    /// Without a content-range the body is written from offset 0. Returns
    /// the number of bytes written.
    pub async fn commit(&self, result: TransferResult) -> Result<u64> {
        match result.content_range.as_deref() {
            Some(header) => {
                let range = ContentRange::parse(header)?;
                self.write_body(result.body, range.start, Some(range.expected_len()))
                    .await
            }
            None => self.write_body(result.body, 0, None).await,
        }
    }

    /// Write the answer to a ranged or part request.
    ///
    /// The response must carry a content-range, and for a byte range it must
    /// name exactly the requested span. Bytes past the announced end are
    /// never written.
    pub async fn commit_chunk(
        &self,
        result: TransferResult,
        descriptor: ChunkDescriptor,
    ) -> Result<u64> {
        let header = result.content_range.as_deref().ok_or_else(|| {
            TransferError::InvalidContentRange(format!("missing for {}", descriptor))
        })?;
        let range = ContentRange::parse(header)?;

        if let ChunkDescriptor::Range(requested) = descriptor {
            if range.start != requested.start || range.end != requested.end {
                return Err(TransferError::InvalidContentRange(format!(
                    "{} answered with {}",
                    requested, header
                )));
            }
        }

        self.write_body(result.body, range.start, Some(range.expected_len()))
            .await
    }

    async fn write_body(&self, body: BodyReader, start: u64, expected: Option<u64>) -> Result<u64> {
        // One byte past the announced length is enough to spot an over-long body
        let mut body: BodyReader = match expected {
            Some(len) => Box::pin(body.take(len.saturating_add(1))),
            None => body,
        };
        let mut buffer = vec![0u8; WRITE_BUFFER_SIZE];
        let mut received = 0u64;

        loop {
            let filled = fill_buffer(&mut body, &mut buffer).await?;
            if filled == 0 {
                break;
            }
            let writable = match expected {
                Some(len) => len.saturating_sub(received).min(filled as u64) as usize,
                None => filled,
            };
            if writable > 0 {
                self.write_at(buffer[..writable].to_vec(), start + received)
                    .await?;
            }
            received += filled as u64;
            if filled < buffer.len() {
                break;
            }
        }

        if let Some(expected) = expected {
            if received != expected {
                return Err(TransferError::IncompleteChunk {
                    offset: start,
                    expected,
                    actual: received,
                });
            }
        }

        tracing::trace!(offset = start, bytes = received, "committed chunk");
        Ok(received)
    }

    /// Flush file contents to storage
    pub async fn sync(&self) -> Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(|e| TransferError::Worker(format!("sync {}: {}", self.path.display(), e)))??;
        Ok(())
    }

    async fn write_at(&self, data: Vec<u8>, offset: u64) -> Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || write_all_at(&file, &data, offset))
            .await
            .map_err(|e| TransferError::Worker(format!("write {}: {}", self.path.display(), e)))??;
        Ok(())
    }
}

/// Read until the buffer is full or the body ends
async fn fill_buffer(body: &mut BodyReader, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = body.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        match file.seek_write(data, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                data = &data[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
