//! Configuration types for the S3 client

use super::error::{S3Error, S3Result};
use serde::{Deserialize, Serialize};

/// S3 client configuration
///
/// The bucket is not part of the client configuration; every request names
/// its own [`ObjectLocation`](crate::protocol::ObjectLocation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// AWS region (e.g., "us-east-1"); discovered per bucket when absent
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,

    /// AWS access key ID (optional - uses credential chain if not provided)
    pub access_key: Option<String>,

    /// AWS secret access key (optional - uses credential chain if not provided)
    pub secret_key: Option<String>,

    /// Session token (for temporary credentials)
    pub session_token: Option<String>,

    /// Path-style addressing (required for some S3-compatible services)
    pub force_path_style: bool,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Maximum attempts per request, handed to the SDK retry policy
    pub max_retries: u32,
}

impl S3Config {
    /// Validate the configuration
    pub fn validate(&self) -> S3Result<()> {
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(S3Error::InvalidConfig(
                "Both access_key and secret_key must be provided together".to_string(),
            ));
        }

        if self.session_token.is_some() && self.access_key.is_none() {
            return Err(S3Error::InvalidConfig(
                "session_token requires explicit access_key and secret_key".to_string(),
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(S3Error::InvalidConfig(
                "Timeout must be at least 1 second".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(S3Error::InvalidConfig(
                "max_retries must be at least 1 (one attempt)".to_string(),
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(S3Error::InvalidConfig(format!(
                    "Endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }

        Ok(())
    }

    /// Check if using custom endpoint (S3-compatible service)
    pub fn is_custom_endpoint(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Check if using explicit credentials
    pub fn has_explicit_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            session_token: None,
            force_path_style: false,
            timeout_seconds: 300, // 5 minutes
            max_retries: 3,
        }
    }
}

/// Builder for S3Config
#[derive(Debug, Default)]
pub struct S3ConfigBuilder {
    config: S3Config,
}

impl S3ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, region: String) -> Self {
        self.config.region = Some(region);
        self
    }

    /// Set custom endpoint (for MinIO, LocalStack, etc.)
    pub fn endpoint(mut self, endpoint: String) -> Self {
        self.config.endpoint = Some(endpoint);
        self
    }

    pub fn credentials(mut self, access_key: String, secret_key: String) -> Self {
        self.config.access_key = Some(access_key);
        self.config.secret_key = Some(secret_key);
        self
    }

    pub fn session_token(mut self, token: String) -> Self {
        self.config.session_token = Some(token);
        self
    }

    pub fn force_path_style(mut self, force: bool) -> Self {
        self.config.force_path_style = force;
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Build the configuration
    pub fn build(self) -> S3Result<S3Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = S3Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_custom_endpoint());
        assert!(!config.has_explicit_credentials());
    }

    #[test]
    fn test_builder() {
        let config = S3ConfigBuilder::new()
            .region("eu-west-1".to_string())
            .endpoint("http://localhost:9000".to_string())
            .credentials("minioadmin".to_string(), "minioadmin".to_string())
            .force_path_style(true)
            .max_retries(5)
            .build()
            .unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert!(config.is_custom_endpoint());
        assert!(config.has_explicit_credentials());
        assert!(config.force_path_style);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_partial_credentials_rejected() {
        let config = S3Config {
            access_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(S3Error::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let result = S3ConfigBuilder::new()
            .endpoint("localhost:9000".to_string())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: S3Config = toml::from_str("region = \"us-east-2\"").unwrap();
        assert_eq!(config.region.as_deref(), Some("us-east-2"));
        assert_eq!(config.timeout_seconds, 300);
        assert_eq!(config.max_retries, 3);
    }
}
