//! Durable-tier operations used by the server coordinator

use bytes::Bytes;
use std::sync::Arc;
use tiercache_storage::DurableStore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::KeyValSettings;
use crate::directive::PersistDirective;
use crate::error::CoreError;
use crate::record::WriteRecord;

/// Write-through, read-through and delete against the durable store
pub struct PersistenceService {
    store: Arc<dyn DurableStore>,
}

impl PersistenceService {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Schedule a durable copy of a write without waiting for it
    ///
    /// Failures are logged and counted, never returned: the edge-cache write
    /// is the transaction of record. The handle is only for callers that want
    /// to observe completion (tests, shutdown).
    pub fn write_through(
        &self,
        key: &str,
        record: &WriteRecord,
        directive: &PersistDirective,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let key = key.to_string();
        let data = record.to_bytes();
        let directive = directive.clone();

        tokio::spawn(async move {
            debug!(
                "Persisting {}/{} ({} bytes)",
                directive.bucket,
                key,
                data.len()
            );

            if let Err(e) = store
                .put(&directive.bucket, &key, data, &directive.upload_options)
                .await
            {
                metrics::counter!("tiercache_persist_failures_total", "op" => "put").increment(1);
                warn!("Background persist failed for {}/{}: {}", directive.bucket, key, e);
            }
        })
    }

    /// Recover the stored write for `key`
    ///
    /// `Ok(None)` when nothing is stored. A stored record that no longer
    /// validates is an error so the caller can log it and treat it as a miss.
    /// The record comes back exactly as first accepted, TTL included.
    pub async fn recover(
        &self,
        key: &str,
        directive: &PersistDirective,
        settings: &KeyValSettings,
    ) -> Result<Option<WriteRecord>, CoreError> {
        if !self.store.exists(&directive.bucket, key).await? {
            debug!("No durable copy of {}/{}", directive.bucket, key);
            return Ok(None);
        }

        let data: Bytes = self.store.get(&directive.bucket, key).await?;
        debug!(
            "Read durable copy of {}/{} ({} bytes)",
            directive.bucket,
            key,
            data.len()
        );

        Ok(Some(WriteRecord::parse(&data, settings)?))
    }

    /// Delete the durable copy, returns whether one existed
    pub async fn remove(&self, key: &str, directive: &PersistDirective) -> Result<bool, CoreError> {
        debug!("Deleting durable copy of {}/{}", directive.bucket, key);
        Ok(self.store.delete(&directive.bucket, key).await?)
    }
}
