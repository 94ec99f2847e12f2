//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid bucket name: {0}")]
    InvalidBucket(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Object store error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub(crate) fn from_object_store(err: object_store::Error, bucket: &str, key: &str) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            other => StorageError::Backend(other.to_string()),
        }
    }
}
