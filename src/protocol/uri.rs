/*!
 * S3 URI parsing and object location validation
 */

use super::ObjectLocation;
use crate::error::{Result, TransferError};

/// Parse `s3://bucket/key` with an optional `?versionId=` query
pub fn parse_s3_uri(uri: &str) -> Result<ObjectLocation> {
    let rest = uri.strip_prefix("s3://").ok_or_else(|| {
        TransferError::InvalidConfiguration(format!(
            "Unsupported URI '{}': expected s3://bucket/key",
            uri
        ))
    })?;

    // Split off query parameters if present
    let (bucket_and_key, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let (bucket, key) = bucket_and_key.split_once('/').ok_or_else(|| {
        TransferError::InvalidConfiguration(
            "S3 URI must include bucket and key: s3://bucket/key".to_string(),
        )
    })?;

    let mut location = ObjectLocation::new(bucket, key);

    if let Some(query) = query {
        for param in query.split('&').filter(|p| !p.is_empty()) {
            match param.split_once('=') {
                Some(("versionId", value)) if !value.is_empty() => {
                    location = location.with_version(value);
                }
                _ => {
                    return Err(TransferError::InvalidConfiguration(format!(
                        "Unsupported S3 URI parameter: {}",
                        param
                    )))
                }
            }
        }
    }

    validate_location(&location)?;
    Ok(location)
}

/// Check bucket naming rules and key presence
pub fn validate_location(location: &ObjectLocation) -> Result<()> {
    if !is_valid_bucket_name(&location.bucket) {
        return Err(TransferError::InvalidConfiguration(format!(
            "Invalid bucket name: {}. Bucket names must be 3-63 characters, \
             lowercase letters, numbers, hyphens, and periods only",
            location.bucket
        )));
    }

    if location.key.is_empty() {
        return Err(TransferError::InvalidConfiguration(
            "Object key cannot be empty".to_string(),
        ));
    }

    // S3 caps keys at 1024 bytes of UTF-8
    if location.key.len() > 1024 {
        return Err(TransferError::InvalidConfiguration(format!(
            "Object key exceeds 1024 bytes: {}",
            location.key.len()
        )));
    }

    Ok(())
}

/// Validate S3 bucket name according to AWS rules
fn is_valid_bucket_name(name: &str) -> bool {
    if !(3..=63).contains(&name.len()) {
        return false;
    }

    // Must start and end with lowercase letter or number
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return false;
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return false;
    }

    if name.contains("..") {
        return false;
    }

    // Cannot be formatted as IP address
    if name.split('.').count() == 4 && name.split('.').all(|s| s.parse::<u8>().is_ok()) {
        return false;
    }

    !name.starts_with("xn--") && !name.ends_with("-s3alias")
}
