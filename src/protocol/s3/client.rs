//! S3 client implementation

use super::cache::RegionCache;
use super::config::S3Config;
use super::error::{S3Error, S3Result};
use crate::protocol::{FetchTarget, ObjectLocation, ObjectProbe, ObjectService, TransferResult};
use crate::transfer::planner::ChunkDescriptor;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Header S3 uses to name a bucket's home region on redirects
const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

/// S3 client for AWS S3 and S3-compatible storage
#[derive(Clone)]
pub struct S3Client {
    client: AwsS3Client,
    config: S3Config,
    regions: Arc<RegionCache>,
}

impl S3Client {
    /// Create a client with a private region cache
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ferry::protocol::s3::{S3Client, S3Config};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = S3Client::new(S3Config::default()).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: S3Config) -> S3Result<Self> {
        Self::with_region_cache(config, Arc::new(RegionCache::new())).await
    }

    /// Create a client that shares region discoveries through `regions`
    pub async fn with_region_cache(config: S3Config, regions: Arc<RegionCache>) -> S3Result<Self> {
        config.validate()?;
        let client = Self::build_aws_client(&config).await?;
        Ok(Self {
            client,
            config,
            regions,
        })
    }

    /// Create a client pointed at the region `bucket` lives in.
    ///
    /// An explicit region or a custom endpoint is used as is. Otherwise the
    /// region comes from the cache, or from a `HeadBucket` discovery whose
    /// answer is cached for later clients.
    pub async fn for_bucket(
        mut config: S3Config,
        bucket: &str,
        regions: Arc<RegionCache>,
    ) -> S3Result<Self> {
        if config.region.is_some() || config.is_custom_endpoint() {
            return Self::with_region_cache(config, regions).await;
        }

        if let Some(region) = regions.get(bucket) {
            tracing::debug!(bucket, region = %region, "using cached bucket region");
            config.region = Some(region);
            return Self::with_region_cache(config, regions).await;
        }

        let discovery = Self::with_region_cache(config.clone(), Arc::clone(&regions)).await?;
        match discovery.discover_region(bucket).await? {
            Some(region) => {
                config.region = Some(region);
                Self::with_region_cache(config, regions).await
            }
            None => Ok(discovery),
        }
    }

    /// Build the AWS SDK S3 client from configuration
    async fn build_aws_client(config: &S3Config) -> S3Result<AwsS3Client> {
        let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest());

        let region_provider = if let Some(region_str) = &config.region {
            RegionProviderChain::first_try(Region::new(region_str.clone()))
        } else {
            RegionProviderChain::default_provider().or_else(Region::new("us-east-1"))
        };
        aws_config_loader = aws_config_loader.region(region_provider);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials = Credentials::new(
                access_key,
                secret_key,
                config.session_token.clone(),
                None,
                "ferry-explicit",
            );
            aws_config_loader = aws_config_loader.credentials_provider(credentials);
        }

        // Retries live in the SDK; the transfer engine never retries
        aws_config_loader =
            aws_config_loader.retry_config(RetryConfig::standard().with_max_attempts(config.max_retries));

        let aws_config = aws_config_loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        // Required for MinIO, LocalStack
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_seconds))
            .build();
        s3_config_builder = s3_config_builder.timeout_config(timeout_config);

        Ok(AwsS3Client::from_conf(s3_config_builder.build()))
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    pub fn region_cache(&self) -> &Arc<RegionCache> {
        &self.regions
    }

    pub(crate) fn aws_client(&self) -> &AwsS3Client {
        &self.client
    }

    /// Look up a bucket's region with `HeadBucket` and cache it.
    ///
    /// A redirect from the wrong region still names the right one, so it
    /// counts as a successful discovery.
    #[tracing::instrument(skip(self), fields(otel.kind = "client"))]
    pub async fn discover_region(&self, bucket: &str) -> S3Result<Option<String>> {
        let region = match self.client.head_bucket().bucket(bucket).send().await {
            Ok(output) => output.bucket_region().map(str::to_string),
            Err(err) => {
                let redirected = match &err {
                    SdkError::ServiceError(e) => e
                        .raw()
                        .headers()
                        .get(BUCKET_REGION_HEADER)
                        .map(str::to_string),
                    _ => None,
                };
                match redirected {
                    Some(region) => Some(region),
                    None => return Err(bucket_error(bucket, err)),
                }
            }
        };

        if let Some(region) = &region {
            tracing::info!(bucket, region = %region, "discovered bucket region");
            self.regions.insert(bucket, region);
        }
        Ok(region)
    }
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("region", &self.config.region)
            .field("endpoint", &self.config.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectService for S3Client {
    #[tracing::instrument(
        skip(self),
        fields(otel.kind = "client", bucket = %location.bucket, key = %location.key)
    )]
    async fn probe(
        &self,
        location: &ObjectLocation,
        part_number: Option<u32>,
    ) -> S3Result<ObjectProbe> {
        let response = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .set_version_id(location.version_id.clone())
            .set_part_number(part_number.map(|n| n as i32))
            .send()
            .await
            .map_err(|e| object_error(location, e))?;

        Ok(ObjectProbe {
            content_length: response.content_length().unwrap_or(0).max(0) as u64,
            parts_count: response
                .parts_count()
                .and_then(|count| u32::try_from(count).ok()),
        })
    }

    #[tracing::instrument(
        skip(self),
        fields(otel.kind = "client", bucket = %location.bucket, key = %location.key)
    )]
    async fn fetch(
        &self,
        location: &ObjectLocation,
        target: FetchTarget,
    ) -> S3Result<TransferResult> {
        let mut request = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .set_version_id(location.version_id.clone());

        request = match target {
            FetchTarget::Whole => request,
            FetchTarget::Chunk(ChunkDescriptor::Range(range)) => request.range(range.to_string()),
            FetchTarget::Chunk(ChunkDescriptor::Part(number)) => {
                request.part_number(number as i32)
            }
        };

        let output = request
            .send()
            .await
            .map_err(|e| object_error(location, e))?;

        let content_range = match target {
            FetchTarget::Whole => None,
            FetchTarget::Chunk(_) => output.content_range().map(str::to_string),
        };

        Ok(TransferResult::new(
            content_range,
            Box::pin(output.body.into_async_read()),
        ))
    }

    #[tracing::instrument(
        skip(self, body),
        fields(otel.kind = "client", bucket = %location.bucket, key = %location.key, size = body.len())
    )]
    async fn put(&self, location: &ObjectLocation, body: Bytes) -> S3Result<()> {
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| object_error(location, e))?;
        Ok(())
    }
}

/// Map an object request failure, naming the object on 404
pub(crate) fn object_error<E>(location: &ObjectLocation, err: SdkError<E>) -> S3Error
where
    E: std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    if status == Some(404) || err.to_string().contains("NoSuchKey") {
        S3Error::NotFound {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        }
    } else {
        S3Error::from(err)
    }
}

fn bucket_error<E>(bucket: &str, err: SdkError<E>) -> S3Error
where
    E: std::error::Error + 'static,
{
    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(404) => S3Error::BucketNotFound(bucket.to_string()),
        Some(403) => S3Error::AccessDenied(format!("Cannot access bucket: {}", bucket)),
        _ => S3Error::from(err),
    }
}
