//! Download strategy selection from metadata probes

use serde::Serialize;
use std::fmt;

use super::planner::{effective_chunk_size, plan_ranges, ByteRange, ChunkDescriptor, PlanLimits};
use crate::config::DownloadMode;
use crate::error::{Result, TransferError};
use crate::protocol::{ObjectLocation, ObjectService};

/// Which request shape a download ends up using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStrategy {
    SingleRequest,
    RangeFanOut,
    PartFanOut,
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStrategy::SingleRequest => write!(f, "single request"),
            TransferStrategy::RangeFanOut => write!(f, "range fan-out"),
            TransferStrategy::PartFanOut => write!(f, "part fan-out"),
        }
    }
}

/// Terminal state of the selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    /// One whole-object fetch; the length is known only when a probe ran
    SingleRequest { content_length: Option<u64> },

    /// Fetch each planned byte range
    RangeFanOut {
        content_length: u64,
        ranges: Vec<ByteRange>,
    },

    /// Fetch parts `1..=parts_count` by number
    PartFanOut { content_length: u64, parts_count: u32 },
}

impl TransferPlan {
    pub fn strategy(&self) -> TransferStrategy {
        match self {
            TransferPlan::SingleRequest { .. } => TransferStrategy::SingleRequest,
            TransferPlan::RangeFanOut { .. } => TransferStrategy::RangeFanOut,
            TransferPlan::PartFanOut { .. } => TransferStrategy::PartFanOut,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        match self {
            TransferPlan::SingleRequest { content_length } => *content_length,
            TransferPlan::RangeFanOut { content_length, .. }
            | TransferPlan::PartFanOut { content_length, .. } => Some(*content_length),
        }
    }

    /// Work items for the worker pool, in increasing offset order.
    /// Empty for a single request.
    pub fn descriptors(&self) -> Vec<ChunkDescriptor> {
        match self {
            TransferPlan::SingleRequest { .. } => Vec::new(),
            TransferPlan::RangeFanOut { ranges, .. } => {
                ranges.iter().copied().map(ChunkDescriptor::Range).collect()
            }
            TransferPlan::PartFanOut { parts_count, .. } => {
                (1..=*parts_count).map(ChunkDescriptor::Part).collect()
            }
        }
    }
}

/// Decide for an object that reports no multipart structure
pub fn plan_unpartitioned(
    content_length: u64,
    chunk_size: Option<u64>,
    limits: PlanLimits,
) -> Result<TransferPlan> {
    if content_length < limits.min_chunk_size {
        return Ok(TransferPlan::SingleRequest {
            content_length: Some(content_length),
        });
    }

    Ok(TransferPlan::RangeFanOut {
        content_length,
        ranges: plan_ranges(content_length, chunk_size, limits)?,
    })
}

/// Decide for an object uploaded in `parts_count` parts.
///
/// Existing part boundaries are reused when they are at least as coarse as
/// the locally planned chunk; finer local chunks win otherwise.
pub fn plan_partitioned(
    content_length: u64,
    parts_count: u32,
    chunk_size: Option<u64>,
    limits: PlanLimits,
) -> Result<TransferPlan> {
    if content_length < limits.min_chunk_size || parts_count == 0 {
        return Ok(TransferPlan::SingleRequest {
            content_length: Some(content_length),
        });
    }

    let planned_chunk = effective_chunk_size(content_length, chunk_size, limits)?;
    let average_part = content_length.div_ceil(u64::from(parts_count));

    if planned_chunk < average_part {
        plan_unpartitioned(content_length, chunk_size, limits)
    } else {
        Ok(TransferPlan::PartFanOut {
            content_length,
            parts_count,
        })
    }
}

/// Run the probes the mode requires and pick a plan
pub async fn select_plan(
    service: &dyn ObjectService,
    location: &ObjectLocation,
    mode: DownloadMode,
    chunk_size: Option<u64>,
    limits: PlanLimits,
) -> Result<TransferPlan> {
    match mode {
        DownloadMode::SingleRequest => Ok(TransferPlan::SingleRequest {
            content_length: None,
        }),
        DownloadMode::GetRange => {
            let chunk_size = chunk_size.ok_or_else(|| {
                TransferError::InvalidConfiguration(
                    "get_range mode requires a chunk size".to_string(),
                )
            })?;
            let probe = service
                .probe(location, None)
                .await
                .map_err(|e| TransferError::remote(format!("probe {}", location), e))?;
            Ok(TransferPlan::RangeFanOut {
                content_length: probe.content_length,
                ranges: plan_ranges(probe.content_length, Some(chunk_size), limits)?,
            })
        }
        DownloadMode::Auto => {
            let first = service
                .probe(location, Some(1))
                .await
                .map_err(|e| TransferError::remote(format!("probe {} part 1", location), e))?;

            match first.parts_count {
                Some(count) if count > 1 => {
                    let whole = service
                        .probe(location, None)
                        .await
                        .map_err(|e| TransferError::remote(format!("probe {}", location), e))?;
                    tracing::debug!(
                        parts_count = count,
                        content_length = whole.content_length,
                        "object has multipart structure"
                    );
                    plan_partitioned(whole.content_length, count, chunk_size, limits)
                }
                _ => plan_unpartitioned(first.content_length, chunk_size, limits),
            }
        }
    }
}
