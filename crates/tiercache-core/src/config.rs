//! Server-side key/value settings

use http::{HeaderMap, HeaderValue};

use crate::codec::{X_MISS_TTL, X_PERSIST};
use crate::directive::{PersistConfig, PersistDirective, PersistRequest};
use crate::entry::FALLBACK_CONTENT_TYPE;
use crate::error::CoreError;

/// Default request body limit (50 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// Settings the server coordinator is constructed with
#[derive(Debug, Clone)]
pub struct KeyValSettings {
    /// Content type for writes that do not name one
    pub default_content_type: String,
    /// TTL for writes that do not carry a usable one
    pub default_ttl: Option<u64>,
    /// Negative-cache TTL for misses, seconds
    pub miss_ttl: u64,
    /// Largest accepted request body in bytes
    pub max_body_size: usize,
    pub persist: PersistConfig,
}

impl Default for KeyValSettings {
    fn default() -> Self {
        Self {
            default_content_type: FALLBACK_CONTENT_TYPE.to_string(),
            default_ttl: None,
            miss_ttl: 0,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            persist: PersistConfig::default(),
        }
    }
}

impl KeyValSettings {
    /// Check the settings once at startup
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_body_size == 0 {
            return Err(CoreError::Configuration(
                "max_body_size must be positive".to_string(),
            ));
        }
        self.persist.validate()
    }

    /// Negative-cache TTL for a miss
    ///
    /// A request override wins when it is a non-negative integer; anything
    /// else falls back to the configured `miss_ttl`.
    pub fn miss_ttl_for(&self, headers: &HeaderMap) -> u64 {
        headers
            .get(X_MISS_TTL)
            .and_then(parse_miss_ttl)
            .unwrap_or(self.miss_ttl)
    }

    /// Persistence target for a request, if any
    pub fn resolve_persist(&self, headers: &HeaderMap) -> Option<PersistDirective> {
        let request = PersistRequest::from_header(headers.get(X_PERSIST));
        self.persist.resolve(&request)
    }
}

fn parse_miss_ttl(value: &HeaderValue) -> Option<u64> {
    value.to_str().ok()?.trim().parse::<u64>().ok()
}
