//! Amazon S3 implementation of the object service boundary
//!
//! [`S3Client`] implements [`ObjectService`](crate::protocol::ObjectService)
//! and [`MultipartUploader`](crate::protocol::MultipartUploader) on top of
//! the official AWS SDK for Rust. It works against AWS S3 as well as
//! S3-compatible services (MinIO, LocalStack) through a custom endpoint and
//! path-style addressing.
//!
//! The SDK-backed client is compiled with the `s3-native` feature (on by
//! default). Errors, configuration and the region cache are always available
//! so the transfer engine and its fakes build without the SDK.
//!
//! # Example
//!
//! ```ignore
//! use ferry::protocol::s3::{RegionCache, S3Client, S3Config};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let regions = Arc::new(RegionCache::new());
//!     let config = S3Config {
//!         endpoint: Some("http://localhost:9000".to_string()),
//!         region: Some("us-east-1".to_string()), // Required even for MinIO
//!         access_key: Some("minioadmin".to_string()),
//!         secret_key: Some("minioadmin".to_string()),
//!         force_path_style: true,
//!         ..Default::default()
//!     };
//!
//!     let client = S3Client::for_bucket(config, "my-bucket", regions).await?;
//!     Ok(())
//! }
//! ```

mod cache;
#[cfg(feature = "s3-native")]
mod client;
mod config;
mod error;
#[cfg(feature = "s3-native")]
mod multipart;


pub use cache::{RegionCache, RegionListener};
#[cfg(feature = "s3-native")]
pub use client::S3Client;
pub use config::{S3Config, S3ConfigBuilder};
pub use error::{S3Error, S3Result};
