//! Core error types

use thiserror::Error;

use crate::record::RecordError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] tiercache_storage::StorageError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Invalid stored record: {0}")]
    InvalidRecord(#[from] RecordError),
}
