//! In-memory object service shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use ferry::protocol::s3::{S3Error, S3Result};
use ferry::protocol::{
    FetchTarget, MultipartUploader, ObjectLocation, ObjectProbe, ObjectService, TransferResult,
    UploadOptions,
};
use ferry::transfer::ChunkDescriptor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;

/// Deterministic, non-repeating-per-MiB test payload
pub fn payload(size: u64) -> Bytes {
    (0..size)
        .map(|i| ((i * 31 + i / 4099) % 251) as u8)
        .collect::<Vec<u8>>()
        .into()
}

/// One request the fake received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe {
        part_number: Option<u32>,
        version_id: Option<String>,
    },
    Fetch {
        target: FetchTarget,
        version_id: Option<String>,
    },
    Put {
        key: String,
        size: usize,
    },
    Multipart {
        key: String,
        size: u64,
        options: UploadOptions,
    },
}

struct StoredObject {
    data: Bytes,
    /// Sizes of the parts the object was uploaded with
    parts: Option<Vec<u64>>,
}

/// Object service backed by a map, recording every call
#[derive(Default)]
pub struct FakeService {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<Vec<ChunkDescriptor>>,
    truncated: Mutex<Vec<ChunkDescriptor>>,
    multipart_failure: Mutex<Option<S3Error>>,
    ignore_ranges: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Duration,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(2),
            ..Default::default()
        }
    }

    pub fn insert(&self, location: &ObjectLocation, data: Bytes) {
        self.store(location, data, None);
    }

    /// Store an object as if uploaded in parts of `part_size`
    pub fn insert_multipart(&self, location: &ObjectLocation, data: Bytes, part_size: u64) {
        let total = data.len() as u64;
        let mut parts = vec![part_size; (total / part_size) as usize];
        if total % part_size != 0 {
            parts.push(total % part_size);
        }
        self.store(location, data, Some(parts));
    }

    fn store(&self, location: &ObjectLocation, data: Bytes, parts: Option<Vec<u64>>) {
        self.objects.lock().unwrap().insert(
            (location.bucket.clone(), location.key.clone()),
            StoredObject { data, parts },
        );
    }

    pub fn object(&self, location: &ObjectLocation) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|o| o.data.clone())
    }

    /// Fail every fetch of `descriptor` with a timeout
    pub fn fail_on(&self, descriptor: ChunkDescriptor) {
        self.failing.lock().unwrap().push(descriptor);
    }

    /// Answer `descriptor` with a body one byte short of its content-range
    pub fn truncate_on(&self, descriptor: ChunkDescriptor) {
        self.truncated.lock().unwrap().push(descriptor);
    }

    /// Answer ranged and part requests with the whole object, like a server
    /// that does not support `Range`
    pub fn ignore_ranges(&self) {
        self.ignore_ranges.store(true, Ordering::SeqCst);
    }

    pub fn fail_multipart(&self, error: S3Error) {
        *self.multipart_failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn probes(&self) -> Vec<Option<u32>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Probe { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    pub fn fetches(&self) -> Vec<FetchTarget> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Fetch { target, .. } => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn not_found(location: &ObjectLocation) -> S3Error {
        S3Error::NotFound {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        }
    }

    /// Absolute inclusive span of part `number`
    fn part_span(parts: &[u64], number: u32) -> Option<(u64, u64)> {
        let index = (number as usize).checked_sub(1)?;
        let size = *parts.get(index)?;
        let start: u64 = parts[..index].iter().sum();
        Some((start, start + size - 1))
    }
}

#[async_trait]
impl ObjectService for FakeService {
    async fn probe(
        &self,
        location: &ObjectLocation,
        part_number: Option<u32>,
    ) -> S3Result<ObjectProbe> {
        self.record(Call::Probe {
            part_number,
            version_id: location.version_id.clone(),
        });

        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(&(location.bucket.clone(), location.key.clone()))
            .ok_or_else(|| Self::not_found(location))?;
        let total = object.data.len() as u64;

        Ok(match (part_number, &object.parts) {
            (Some(number), Some(parts)) => {
                let (start, end) =
                    Self::part_span(parts, number).ok_or_else(|| Self::not_found(location))?;
                ObjectProbe {
                    content_length: end - start + 1,
                    parts_count: Some(parts.len() as u32),
                }
            }
            _ => ObjectProbe {
                content_length: total,
                parts_count: None,
            },
        })
    }

    async fn fetch(
        &self,
        location: &ObjectLocation,
        target: FetchTarget,
    ) -> S3Result<TransferResult> {
        self.record(Call::Fetch {
            target,
            version_id: location.version_id.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let FetchTarget::Chunk(descriptor) = target {
            if self.failing.lock().unwrap().contains(&descriptor) {
                return Err(S3Error::Timeout(format!("{} timed out", descriptor)));
            }
        }

        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(&(location.bucket.clone(), location.key.clone()))
            .ok_or_else(|| Self::not_found(location))?;
        let total = object.data.len() as u64;

        if self.ignore_ranges.load(Ordering::SeqCst) {
            return Ok(TransferResult::from_bytes(None, object.data.clone()));
        }

        let (start, end) = match target {
            FetchTarget::Whole => return Ok(TransferResult::from_bytes(None, object.data.clone())),
            FetchTarget::Chunk(ChunkDescriptor::Range(range)) => (range.start, range.end.min(total - 1)),
            FetchTarget::Chunk(ChunkDescriptor::Part(number)) => object
                .parts
                .as_deref()
                .and_then(|parts| Self::part_span(parts, number))
                .ok_or_else(|| S3Error::Service {
                    code: "InvalidPartNumber".to_string(),
                    message: format!("no part {}", number),
                })?,
        };

        let mut body = object.data.slice(start as usize..=end as usize);
        if let FetchTarget::Chunk(descriptor) = target {
            if self.truncated.lock().unwrap().contains(&descriptor) {
                body = body.slice(..body.len() - 1);
            }
        }

        Ok(TransferResult::from_bytes(
            Some(format!("bytes {}-{}/{}", start, end, total)),
            body,
        ))
    }

    async fn put(&self, location: &ObjectLocation, body: Bytes) -> S3Result<()> {
        self.record(Call::Put {
            key: location.key.clone(),
            size: body.len(),
        });
        self.insert(location, body);
        Ok(())
    }
}

#[async_trait]
impl MultipartUploader for FakeService {
    async fn upload(
        &self,
        source: &Path,
        location: &ObjectLocation,
        options: &UploadOptions,
    ) -> S3Result<()> {
        let data = tokio::fs::read(source).await?;
        self.record(Call::Multipart {
            key: location.key.clone(),
            size: data.len() as u64,
            options: options.clone(),
        });

        if let Some(error) = self.multipart_failure.lock().unwrap().take() {
            return Err(error);
        }
        let part_size = options.part_size.unwrap_or(5 * MIB);
        self.insert_multipart(location, data.into(), part_size);
        Ok(())
    }
}
