//! Google Cloud Storage bucket construction
//!
//! Each persistence bucket maps onto one GCS bucket. Credentials come from a
//! service account key file or inline key; with neither, `object_store` falls
//! back to application default credentials.

use object_store::ObjectStore;
use object_store::gcp::GoogleCloudStorageBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::StorageError;

/// GCS connection settings shared by every bucket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcsConfig {
    /// Path to a service account key file
    #[serde(default)]
    pub service_account_path: Option<String>,
    /// Service account key as JSON text
    #[serde(default)]
    pub service_account_key: Option<String>,
    /// Project the buckets belong to, for logging
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Build an object store handle for one GCS bucket
pub(crate) fn build_bucket(
    config: &GcsConfig,
    bucket: &str,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(bucket);

    if let Some(path) = &config.service_account_path {
        builder = builder.with_service_account_path(path);
    }
    if let Some(key) = &config.service_account_key {
        builder = builder.with_service_account_key(key);
    }

    let store = builder.build().map_err(|e| {
        StorageError::Configuration(format!("Failed to create GCS client: {}", e))
    })?;

    info!(
        "Opened GCS bucket: bucket={}, project={:?}",
        bucket, config.project_id
    );

    Ok(Arc::new(store))
}
