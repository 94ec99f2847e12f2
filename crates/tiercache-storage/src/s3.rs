//! S3-compatible bucket construction
//!
//! Uses the `object_store` crate. Supports AWS S3, MinIO, and other
//! S3-compatible services. Each persistence bucket maps onto one S3 bucket.

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::StorageError;

/// S3 connection settings shared by every bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 region (e.g., "us-east-1")
    #[serde(default = "default_region")]
    pub region: String,
    /// S3 endpoint URL (for MinIO or other S3-compatible services)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// AWS access key ID
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// AWS secret access key
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Allow HTTP (not HTTPS) connections
    #[serde(default)]
    pub allow_http: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Build an object store handle for one S3 bucket
pub(crate) fn build_bucket(
    config: &S3Config,
    bucket: &str,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(&config.region);

    // Set endpoint for MinIO or other S3-compatible services
    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint);
    }

    if let Some(access_key) = &config.access_key_id {
        builder = builder.with_access_key_id(access_key);
    }
    if let Some(secret_key) = &config.secret_access_key {
        builder = builder.with_secret_access_key(secret_key);
    }

    // Allow HTTP for local development (MinIO)
    if config.allow_http {
        builder = builder.with_allow_http(true);
    }

    let store = builder.build().map_err(|e| {
        StorageError::Configuration(format!("Failed to create S3 client: {}", e))
    })?;

    info!(
        "Opened S3 bucket: bucket={}, region={}, endpoint={:?}",
        bucket, config.region, config.endpoint
    );

    Ok(Arc::new(store))
}
