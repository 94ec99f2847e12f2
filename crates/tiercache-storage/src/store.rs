//! `object_store`-backed durable store
//!
//! One `ObjectStore` handle is opened lazily per bucket and reused for the
//! lifetime of the process.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, PutPayload};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{
    DurableStore, UploadOptions, decode_payload, encode_payload, object_path, validate_bucket,
};
use crate::error::StorageError;
use crate::gcs::{self, GcsConfig};
use crate::s3::{self, S3Config};

/// Which object store hosts the persistence buckets
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store, lost on restart
    #[default]
    Memory,
    /// One directory per bucket below `root`
    Local { root: PathBuf },
    /// One S3 bucket per persistence bucket
    S3(S3Config),
    /// One Google Cloud Storage bucket per persistence bucket
    Gcs(GcsConfig),
}

impl StoreConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Local { .. } => "local",
            StoreConfig::S3(_) => "s3",
            StoreConfig::Gcs(_) => "gcs",
        }
    }

    /// Whether the backend can keep object attributes (content type etc.)
    fn supports_attributes(&self) -> bool {
        !matches!(self, StoreConfig::Local { .. })
    }
}

/// Durable store built on `object_store`
pub struct ObjectStoreBackend {
    config: StoreConfig,
    buckets: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreBackend {
    /// Create a new backend; buckets are opened on first use
    pub fn new(config: StoreConfig) -> Self {
        info!("Initialized durable store (backend: {})", config.as_str());

        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Get the handle for a bucket, opening it if needed
    async fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        validate_bucket(name)?;

        let cached = self.buckets.read().get(name).cloned();
        if let Some(store) = cached {
            return Ok(store);
        }

        let opened = self.open(name).await?;
        let mut buckets = self.buckets.write();
        // Another task may have opened it meanwhile; keep the first handle
        let store = buckets.entry(name.to_string()).or_insert(opened);
        Ok(store.clone())
    }

    async fn open(&self, name: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        debug!("Opening bucket {} on {} backend", name, self.config.as_str());

        match &self.config {
            StoreConfig::Memory => Ok(Arc::new(InMemory::new())),
            StoreConfig::Local { root } => {
                let path = root.join(name);
                tokio::fs::create_dir_all(&path).await?;
                let store = LocalFileSystem::new_with_prefix(&path).map_err(|e| {
                    StorageError::Configuration(format!(
                        "Failed to open local bucket {:?}: {}",
                        path, e
                    ))
                })?;
                Ok(Arc::new(store))
            }
            StoreConfig::S3(config) => s3::build_bucket(config, name),
            StoreConfig::Gcs(config) => gcs::build_bucket(config, name),
        }
    }
}

#[async_trait]
impl DurableStore for ObjectStoreBackend {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let store = self.bucket(bucket).await?;
        let path = object_path(key)?;

        match store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::from_object_store(e, bucket, key)),
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let store = self.bucket(bucket).await?;
        let path = object_path(key)?;
        debug!("Reading {}/{}", bucket, key);

        let result = store
            .get(&path)
            .await
            .map_err(|e| StorageError::from_object_store(e, bucket, key))?;

        let data = result
            .bytes()
            .await
            .map_err(|e| StorageError::from_object_store(e, bucket, key))?;

        decode_payload(data)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<(), StorageError> {
        let store = self.bucket(bucket).await?;
        let path = object_path(key)?;
        let data = encode_payload(data, options)?;
        debug!("Writing {}/{} ({} bytes)", bucket, key, data.len());

        let opts = options.to_put_options(self.config.supports_attributes());
        store
            .put_opts(&path, PutPayload::from(data), opts)
            .await
            .map_err(|e| StorageError::from_object_store(e, bucket, key))?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let store = self.bucket(bucket).await?;
        let path = object_path(key)?;
        debug!("Deleting {}/{}", bucket, key);

        // Check if exists first
        if !self.exists(bucket, key).await? {
            return Ok(false);
        }

        match store.delete(&path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::from_object_store(e, bucket, key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let store = ObjectStoreBackend::new(StoreConfig::Memory);
        let options = UploadOptions::default();

        assert!(!store.exists("kv", "greeting").await.unwrap());

        store
            .put("kv", "greeting", Bytes::from_static(b"hello"), &options)
            .await
            .unwrap();
        assert!(store.exists("kv", "greeting").await.unwrap());
        assert_eq!(store.get("kv", "greeting").await.unwrap(), "hello");

        assert!(store.delete("kv", "greeting").await.unwrap());
        assert!(!store.delete("kv", "greeting").await.unwrap());
        assert!(!store.exists("kv", "greeting").await.unwrap());
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let store = ObjectStoreBackend::new(StoreConfig::Memory);
        let options = UploadOptions::default();

        store
            .put("a", "key", Bytes::from_static(b"1"), &options)
            .await
            .unwrap();

        assert!(store.exists("a", "key").await.unwrap());
        assert!(!store.exists("b", "key").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = ObjectStoreBackend::new(StoreConfig::Memory);
        let err = store.get("kv", "missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStoreBackend::new(StoreConfig::Local {
            root: dir.path().to_path_buf(),
        });
        let options = UploadOptions {
            content_type: Some("application/json".to_string()),
            ..Default::default()
        };

        store
            .put("kv", "a/b", Bytes::from_static(b"{}"), &options)
            .await
            .unwrap();

        assert!(dir.path().join("kv").is_dir());
        assert_eq!(store.get("kv", "a/b").await.unwrap(), "{}");
        assert!(store.delete("kv", "a/b").await.unwrap());
        assert!(!store.exists("kv", "a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_gzip_upload_reads_back_plain() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStoreBackend::new(StoreConfig::Local {
            root: dir.path().to_path_buf(),
        });
        let options = UploadOptions {
            gzip: Some(true),
            ..Default::default()
        };
        let record = Bytes::from(r#"{"value":"compress me","ttl":60}"#);

        store
            .put("kv", "packed", record.clone(), &options)
            .await
            .unwrap();

        // Compressed at rest, inflated on read
        let on_disk = std::fs::read(dir.path().join("kv").join("packed")).unwrap();
        assert_eq!(&on_disk[..2], &[0x1f, 0x8b]);
        assert_eq!(store.get("kv", "packed").await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_shares_one_bucket() {
        let store = Arc::new(ObjectStoreBackend::new(StoreConfig::Memory));
        let options = UploadOptions::default();

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    store
                        .put("kv", &format!("k{}", i), Bytes::from_static(b"v"), &options)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        for i in 0..8 {
            assert!(store.exists("kv", &format!("k{}", i)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_invalid_bucket_rejected() {
        let store = ObjectStoreBackend::new(StoreConfig::Memory);
        let err = store.exists("../etc", "key").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidBucket(_)));
    }

    #[test]
    fn test_store_config_from_toml_shape() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"type":"local","root":"/var/lib/tiercache"}"#).unwrap();
        assert_eq!(config.as_str(), "local");

        let config: StoreConfig =
            serde_json::from_str(r#"{"type":"s3","region":"eu-west-1","allow_http":true}"#)
                .unwrap();
        match config {
            StoreConfig::S3(s3) => {
                assert_eq!(s3.region, "eu-west-1");
                assert!(s3.allow_http);
            }
            other => panic!("unexpected backend {}", other.as_str()),
        }
    }

    #[test]
    fn test_gcs_config_shape() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"type":"gcs","project_id":"optimization","service_account_path":"service-account-key.json"}"#,
        )
        .unwrap();
        match config {
            StoreConfig::Gcs(gcs) => {
                assert_eq!(gcs.project_id.as_deref(), Some("optimization"));
                assert_eq!(
                    gcs.service_account_path.as_deref(),
                    Some("service-account-key.json")
                );
            }
            other => panic!("unexpected backend {}", other.as_str()),
        }
    }
}
