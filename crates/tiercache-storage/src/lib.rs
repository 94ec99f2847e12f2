//! tiercache durable storage layer
//!
//! This crate provides the durable backstop tier: a bucketed key/blob store
//! built on `object_store`, with in-memory, local disk, S3 and Google Cloud
//! Storage backends.

pub mod backend;
pub mod error;
pub mod gcs;
pub mod s3;
pub mod store;

pub use backend::{DurableStore, UploadOptions};
pub use error::StorageError;
pub use gcs::GcsConfig;
pub use s3::S3Config;
pub use store::{ObjectStoreBackend, StoreConfig};
