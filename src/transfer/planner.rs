//! Chunk planning: how an object of a given size is sliced into requests

use std::fmt;

use super::{MAX_PARTS, MIN_CHUNK_SIZE};
use crate::error::{Result, TransferError};

/// Inclusive byte range `[start, end]`, rendered as an HTTP range expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of bytes covered; never zero
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// One unit of download work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkDescriptor {
    Range(ByteRange),
    /// 1-based part number of a multipart object
    Part(u32),
}

impl fmt::Display for ChunkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkDescriptor::Range(range) => fmt::Display::fmt(range, f),
            ChunkDescriptor::Part(number) => write!(f, "part {}", number),
        }
    }
}

/// Service limits the planner must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_parts: u64,
    pub min_chunk_size: u64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_parts: MAX_PARTS,
            min_chunk_size: MIN_CHUNK_SIZE,
        }
    }
}

/// Chunk size the planner would use for `total_size`.
///
/// A fixed size wins when given, as long as it keeps the chunk count within
/// `max_parts`; otherwise the size is the smallest one that does, raised to
/// `min_chunk_size`.
pub fn effective_chunk_size(
    total_size: u64,
    fixed_chunk_size: Option<u64>,
    limits: PlanLimits,
) -> Result<u64> {
    match fixed_chunk_size {
        Some(0) => Err(TransferError::InvalidConfiguration(
            "Chunk size must be greater than zero".to_string(),
        )),
        Some(size) if size > total_size => Err(TransferError::InvalidConfiguration(format!(
            "Chunk size {} exceeds object size {}",
            size, total_size
        ))),
        Some(size) if total_size.div_ceil(size) > limits.max_parts => {
            Err(TransferError::InvalidConfiguration(format!(
                "Chunk size {} splits {} bytes into {} chunks, more than the {} allowed",
                size,
                total_size,
                total_size.div_ceil(size),
                limits.max_parts
            )))
        }
        Some(size) => Ok(size),
        None => {
            if limits.max_parts == 0 {
                return Err(TransferError::InvalidConfiguration(
                    "Maximum part count must be greater than zero".to_string(),
                ));
            }
            Ok(total_size
                .div_ceil(limits.max_parts)
                .max(limits.min_chunk_size)
                .max(1))
        }
    }
}

/// Slice `[0, total_size)` into contiguous inclusive ranges.
///
/// Empty objects are rejected; there is nothing to slice.
pub fn plan_ranges(
    total_size: u64,
    fixed_chunk_size: Option<u64>,
    limits: PlanLimits,
) -> Result<Vec<ByteRange>> {
    if total_size == 0 {
        return Err(TransferError::InvalidConfiguration(
            "Cannot plan ranges for an empty object".to_string(),
        ));
    }

    let chunk_size = effective_chunk_size(total_size, fixed_chunk_size, limits)?;

    let mut ranges = Vec::with_capacity(total_size.div_ceil(chunk_size) as usize);
    let mut offset = 0u64;
    while offset < total_size {
        let end = offset.saturating_add(chunk_size).min(total_size) - 1;
        ranges.push(ByteRange::new(offset, end));
        offset = end + 1;
    }

    Ok(ranges)
}

/// Same as [`plan_ranges`], wrapped as download descriptors
pub fn plan(
    total_size: u64,
    fixed_chunk_size: Option<u64>,
    limits: PlanLimits,
) -> Result<Vec<ChunkDescriptor>> {
    Ok(plan_ranges(total_size, fixed_chunk_size, limits)?
        .into_iter()
        .map(ChunkDescriptor::Range)
        .collect())
}
