//! Logical cache entry

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Content type used when neither the writer nor the server names one
pub const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// A complete key/value entry as seen by every tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Bytes,
    pub content_type: String,
    /// Time to live in seconds, always positive
    pub ttl: u64,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Create an entry stamped with the current time
    pub fn new(
        key: impl Into<String>,
        value: impl Into<Bytes>,
        content_type: impl Into<String>,
        ttl: u64,
    ) -> Result<Self, CoreError> {
        Self::with_created_at(key, value, content_type, ttl, Utc::now())
    }

    /// Create an entry with an explicit creation time
    pub fn with_created_at(
        key: impl Into<String>,
        value: impl Into<Bytes>,
        content_type: impl Into<String>,
        ttl: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let key = key.into();
        if key.is_empty() {
            return Err(CoreError::InvalidEntry("empty key".to_string()));
        }
        if ttl == 0 {
            return Err(CoreError::InvalidEntry(format!("ttl must be positive ({})", key)));
        }

        let content_type = content_type.into();
        let content_type = if content_type.is_empty() {
            FALLBACK_CONTENT_TYPE.to_string()
        } else {
            content_type
        };

        Ok(Self {
            key,
            value: value.into(),
            content_type,
            ttl,
            created_at,
        })
    }

    /// Instant after which the entry is expired
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Whole seconds of life left at `now`, zero once expired
    ///
    /// Rounds down so a copy held for this long never outlives the entry.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> u64 {
        if self.is_expired_at(now) {
            return 0;
        }
        u64::try_from((self.expires_at() - now).num_seconds()).unwrap_or(0)
    }

    /// SHA-256 of the value, hex encoded
    ///
    /// Handy as the orthogonal signal for a memory-tier verify predicate.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.value);
        hex::encode(hasher.finalize())
    }
}
