//! Durable store trait

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::{Path as ObjectPath, PathPart};
use object_store::{Attribute, Attributes, PutOptions, TagSet};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::error::StorageError;

/// Durable blob store addressed by `(bucket, key)`
///
/// This is the backstop tier behind the edge cache. Implementations only need
/// the four primitive operations; everything above them (record format,
/// TTL handling, repair) lives in the caller.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Check whether an object exists
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    /// Read an object fully into memory
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Write an object, replacing any previous version
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<(), StorageError>;

    /// Delete an object, returns whether it existed
    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;
}

/// Per-upload options passed through to the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Content type stored with the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Cache-Control stored with the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Object tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Store the object gzip-compressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gzip: Option<bool>,
}

impl UploadOptions {
    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merged(&self, other: &UploadOptions) -> UploadOptions {
        let mut tags = self.tags.clone();
        tags.extend(other.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        UploadOptions {
            content_type: other.content_type.clone().or_else(|| self.content_type.clone()),
            cache_control: other.cache_control.clone().or_else(|| self.cache_control.clone()),
            tags,
            gzip: other.gzip.or(self.gzip),
        }
    }

    pub fn is_gzip(&self) -> bool {
        self.gzip.unwrap_or(false)
    }

    /// Convert into `object_store` put options
    ///
    /// Attributes are dropped when the backend cannot store them.
    pub(crate) fn to_put_options(&self, with_attributes: bool) -> PutOptions {
        let mut tags = TagSet::default();
        for (key, value) in &self.tags {
            tags.push(key, value);
        }

        let mut attributes = Attributes::new();
        if with_attributes {
            if let Some(content_type) = &self.content_type {
                attributes.insert(Attribute::ContentType, content_type.clone().into());
            }
            if let Some(cache_control) = &self.cache_control {
                attributes.insert(Attribute::CacheControl, cache_control.clone().into());
            }
            if self.is_gzip() {
                attributes.insert(Attribute::ContentEncoding, "gzip".into());
            }
        }

        PutOptions {
            tags,
            attributes,
            ..Default::default()
        }
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compress `data` when the upload asks for gzip
pub(crate) fn encode_payload(data: Bytes, options: &UploadOptions) -> Result<Bytes, StorageError> {
    if !options.is_gzip() {
        return Ok(data);
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(&data)?;
    Ok(Bytes::from(encoder.finish()?))
}

/// Undo `encode_payload`
///
/// Detection goes by the gzip magic number, so objects written without
/// compression, or already inflated by the transport, pass through.
pub(crate) fn decode_payload(data: Bytes) -> Result<Bytes, StorageError> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(data);
    }

    let mut decoded = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data.as_ref()).read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}

/// Validate a bucket name
///
/// Buckets become directory names for the local backend, so separators and
/// relative components are rejected.
pub fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    if bucket.is_empty()
        || bucket == "."
        || bucket == ".."
        || bucket.contains('/')
        || bucket.contains('\\')
    {
        return Err(StorageError::InvalidBucket(bucket.to_string()));
    }
    Ok(())
}

/// Map a key onto a single escaped object path segment
pub fn object_path(key: &str) -> Result<ObjectPath, StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    Ok(ObjectPath::from_iter([PathPart::from(key)]))
}
