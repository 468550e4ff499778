//! Multipart upload for large files

use super::client::{object_error, S3Client};
use super::error::{S3Error, S3Result};
use crate::error::TransferError;
use crate::protocol::{MultipartUploader, ObjectLocation, UploadOptions};
use crate::transfer::executor::WorkerPool;
use crate::transfer::planner::{plan_ranges, ByteRange, PlanLimits};
use crate::transfer::segment::FileSegment;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// ETags of uploaded parts, keyed by part number
type PartTags = Arc<Mutex<BTreeMap<i32, String>>>;

#[async_trait]
impl MultipartUploader for S3Client {
    /// Upload `source` in parts planned by the chunk planner.
    ///
    /// Any failure after the upload is created aborts it, then returns the
    /// original error.
    #[tracing::instrument(
        skip(self, options),
        fields(otel.kind = "client", bucket = %location.bucket, key = %location.key)
    )]
    async fn upload(
        &self,
        source: &Path,
        location: &ObjectLocation,
        options: &UploadOptions,
    ) -> S3Result<()> {
        let size = tokio::fs::metadata(source).await?.len();
        let ranges = plan_ranges(size, options.part_size, PlanLimits::default())
            .map_err(|e| S3Error::InvalidConfig(e.to_string()))?;
        let pool = WorkerPool::new(options.concurrency)
            .map_err(|e| S3Error::InvalidConfig(e.to_string()))?;

        let upload_id = self.initiate_multipart_upload(location).await?;
        tracing::debug!(upload_id = %upload_id, parts = ranges.len(), "multipart upload started");

        let outcome = match self
            .upload_parts(&pool, source, location, &upload_id, ranges)
            .await
        {
            Ok(parts) => {
                self.complete_multipart_upload(location, &upload_id, parts)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            tracing::warn!(upload_id = %upload_id, error = %e, "aborting multipart upload");
            if let Err(abort_err) = self.abort_multipart_upload(location, &upload_id).await {
                tracing::warn!(upload_id = %upload_id, error = %abort_err, "abort failed");
            }
        }
        outcome
    }
}

impl S3Client {
    async fn initiate_multipart_upload(&self, location: &ObjectLocation) -> S3Result<String> {
        let response = self
            .aws_client()
            .create_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| object_error(location, e))?;

        response
            .upload_id()
            .ok_or_else(|| S3Error::MultipartUpload("No upload ID returned".to_string()))
            .map(|s| s.to_string())
    }

    /// Upload every range as a part; each part reads its own file segment
    async fn upload_parts(
        &self,
        pool: &WorkerPool,
        source: &Path,
        location: &ObjectLocation,
        upload_id: &str,
        ranges: Vec<ByteRange>,
    ) -> S3Result<Vec<CompletedPart>> {
        let tags: PartTags = Arc::new(Mutex::new(BTreeMap::new()));
        let items: Vec<(i32, ByteRange)> = ranges
            .into_iter()
            .enumerate()
            .map(|(index, range)| (index as i32 + 1, range))
            .collect();

        let source: PathBuf = source.to_path_buf();
        let upload_id = upload_id.to_string();

        pool.run(items, |(part_number, range)| {
            let client = self.clone();
            let location = location.clone();
            let source = source.clone();
            let upload_id = upload_id.clone();
            let tags = Arc::clone(&tags);
            async move {
                let mut segment = FileSegment::new(source, range.start, range.size());
                let body = segment.read(None).await?.unwrap_or_default();
                segment.close();

                let etag = client
                    .upload_part(&location, &upload_id, part_number, body)
                    .await
                    .map_err(|e| {
                        TransferError::remote(
                            format!("upload {} part {}", location, part_number),
                            S3Error::Part {
                                part_number,
                                source: Box::new(e),
                            },
                        )
                    })?;
                tags.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(part_number, etag);
                Ok(range.size())
            }
        })
        .await
        .map_err(into_s3_error)?;

        let tags = std::mem::take(&mut *tags.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(tags
            .into_iter()
            .map(|(part_number, etag)| {
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build()
            })
            .collect())
    }

    async fn upload_part(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
        part_number: i32,
        data: bytes::Bytes,
    ) -> S3Result<String> {
        let response = self
            .aws_client()
            .upload_part()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| object_error(location, e))?;

        response
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| S3Error::MultipartUpload("No ETag returned for part".to_string()))
    }

    async fn complete_multipart_upload(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> S3Result<()> {
        let multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.aws_client()
            .complete_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await
            .map_err(|e| object_error(location, e))?;

        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
    ) -> S3Result<()> {
        self.aws_client()
            .abort_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(S3Error::from)?;

        Ok(())
    }
}

/// Unwrap a pool failure back into the collaborator error it carries.
/// Part failures keep their part number.
fn into_s3_error(err: TransferError) -> S3Error {
    match err {
        TransferError::Remote { source, .. } => source,
        TransferError::Io(e) => S3Error::from(e),
        other => S3Error::MultipartUpload(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_keep_remote_source() {
        let err = into_s3_error(TransferError::remote(
            "upload b/k part 2",
            S3Error::Part {
                part_number: 2,
                source: Box::new(S3Error::Timeout("slow".to_string())),
            },
        ));
        assert!(matches!(err, S3Error::Part { part_number: 2, .. }));
        assert!(err.is_retryable());

        let wrapped = TransferError::remote("multipart upload b/k", err);
        assert!(wrapped.to_string().contains("Part 2 failed"));

        let err = into_s3_error(TransferError::Worker("panicked".to_string()));
        assert!(matches!(err, S3Error::MultipartUpload(_)));

        let err = into_s3_error(TransferError::Io(std::io::Error::other("disk")));
        assert!(matches!(err, S3Error::Io(_)));
    }

    #[tokio::test]
    async fn test_part_cap_rejected_before_upload_starts() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("huge.bin");
        // Sparse: one byte past what 10,000 parts of 5 MiB can hold
        let file = std::fs::File::create(&source).unwrap();
        file.set_len(5 * 1024 * 1024 * crate::transfer::MAX_PARTS + 1)
            .unwrap();
        drop(file);

        let config = super::super::S3Config {
            region: Some("us-east-1".to_string()),
            endpoint: Some("http://127.0.0.1:9".to_string()),
            access_key: Some("key".to_string()),
            secret_key: Some("secret".to_string()),
            force_path_style: true,
            ..Default::default()
        };
        let client = S3Client::new(config).await.unwrap();
        let options = UploadOptions {
            part_size: Some(5 * 1024 * 1024),
            concurrency: 4,
        };

        let err = client
            .upload(&source, &ObjectLocation::new("bucket", "huge.bin"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::InvalidConfig(_)), "{:?}", err);
    }
}
