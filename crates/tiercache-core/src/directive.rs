//! Per-call directives for the memory and durable tiers
//!
//! Callers describe what they want in loose terms (a flag, a TTL, a full
//! options struct). Everything is resolved once at the call boundary into a
//! normalized policy so downstream code never re-interprets the raw input.

use chrono::{DateTime, Utc};
use http::HeaderValue;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tiercache_storage::UploadOptions;
use tracing::warn;

use crate::entry::Entry;
use crate::error::CoreError;

// ==================== Memory tier ====================

/// Caller-supplied check run against a cached entry before it counts as a hit
pub type VerifyFn = Arc<dyn Fn(&Entry) -> bool + Send + Sync>;

/// Explicit memory-tier options for a single call
#[derive(Clone, Default)]
pub struct MemoryOptions {
    /// Memory TTL in seconds, overriding the entry's own TTL
    pub ttl: Option<u64>,
    pub verify: Option<VerifyFn>,
}

impl fmt::Debug for MemoryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryOptions")
            .field("ttl", &self.ttl)
            .field("verify", &self.verify.is_some())
            .finish()
    }
}

/// Memory-tier directive for one client call
#[derive(Clone, Debug, Default)]
pub enum MemoryDirective {
    /// Follow the client's configured default
    #[default]
    Inherit,
    Disabled,
    Enabled,
    EnabledWithOptions(MemoryOptions),
}

impl From<bool> for MemoryDirective {
    fn from(enabled: bool) -> Self {
        if enabled {
            MemoryDirective::Enabled
        } else {
            MemoryDirective::Disabled
        }
    }
}

impl From<MemoryOptions> for MemoryDirective {
    fn from(options: MemoryOptions) -> Self {
        MemoryDirective::EnabledWithOptions(options)
    }
}

/// Client-wide memory-tier defaults
#[derive(Clone)]
pub struct MemoryCacheConfig {
    /// Use the memory tier when a call does not say otherwise
    pub enabled: bool,
    /// Memory TTL in seconds, overriding the entry's own TTL
    pub ttl_override: Option<u64>,
    pub verify: Option<VerifyFn>,
    /// Upper bound on cached entries
    pub max_entries: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_override: None,
            verify: None,
            max_entries: 10_000,
        }
    }
}

impl fmt::Debug for MemoryCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCacheConfig")
            .field("enabled", &self.enabled)
            .field("ttl_override", &self.ttl_override)
            .field("verify", &self.verify.is_some())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl MemoryCacheConfig {
    /// Merge a call directive over these defaults; `None` means skip the tier
    pub fn resolve(&self, directive: &MemoryDirective) -> Option<MemoryPolicy> {
        let instance = MemoryPolicy {
            ttl: self.ttl_override.filter(|ttl| *ttl > 0),
            verify: self.verify.clone(),
        };

        match directive {
            MemoryDirective::Inherit if self.enabled => Some(instance),
            MemoryDirective::Inherit | MemoryDirective::Disabled => None,
            MemoryDirective::Enabled => Some(instance),
            MemoryDirective::EnabledWithOptions(options) => Some(MemoryPolicy {
                ttl: options.ttl.filter(|ttl| *ttl > 0).or(instance.ttl),
                verify: options.verify.clone().or(instance.verify),
            }),
        }
    }
}

/// Resolved memory-tier behaviour for one call
#[derive(Clone, Default)]
pub struct MemoryPolicy {
    pub ttl: Option<u64>,
    pub verify: Option<VerifyFn>,
}

impl MemoryPolicy {
    /// TTL the memory tier should hold `entry` for, as of `now`
    ///
    /// Bounded by the entry's remaining life so the memory copy never
    /// outlives the edge-cache copy; an override can only shorten it.
    pub fn ttl_for(&self, entry: &Entry, now: DateTime<Utc>) -> u64 {
        let remaining = entry.remaining_ttl(now);
        self.ttl.map_or(remaining, |ttl| ttl.min(remaining))
    }
}

impl fmt::Debug for MemoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPolicy")
            .field("ttl", &self.ttl)
            .field("verify", &self.verify.is_some())
            .finish()
    }
}

// ==================== Durable tier ====================

/// When the server persists writes to the durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Never
    #[default]
    Disabled,
    /// Only when the request carries `x-persist`
    Header,
    /// On every request
    Always,
}

impl PersistMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistMode::Disabled => "disabled",
            PersistMode::Header => "header",
            PersistMode::Always => "always",
        }
    }
}

impl FromStr for PersistMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" | "true" => Ok(PersistMode::Always),
            "header" => Ok(PersistMode::Header),
            "false" | "disabled" | "off" => Ok(PersistMode::Disabled),
            _ => Err(CoreError::Configuration(format!("Invalid persist mode: {}", s))),
        }
    }
}

impl Serialize for PersistMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PersistMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(PersistMode::Always),
            Raw::Flag(false) => Ok(PersistMode::Disabled),
            Raw::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

/// Server-side persistence defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistConfig {
    #[serde(default)]
    pub enabled: PersistMode,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub upload_options: UploadOptions,
}

impl PersistConfig {
    /// Reject configurations that could never resolve a bucket
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.enabled == PersistMode::Disabled {
            return Ok(());
        }
        tiercache_storage::backend::validate_bucket(&self.bucket).map_err(|_| {
            CoreError::Configuration(format!(
                "persistence is {} but bucket {:?} is not usable",
                self.enabled.as_str(),
                self.bucket
            ))
        })
    }

    /// Merge a request over the server defaults
    pub fn resolve(&self, request: &PersistRequest) -> Option<PersistDirective> {
        let base = || PersistDirective {
            bucket: self.bucket.clone(),
            upload_options: self.upload_options.clone(),
        };

        match (self.enabled, request) {
            (PersistMode::Disabled, _) => None,
            (PersistMode::Header, PersistRequest::None) => None,
            (PersistMode::Always, PersistRequest::None) | (_, PersistRequest::Requested) => {
                Some(base())
            }
            (_, PersistRequest::WithOptions(overrides)) => {
                let bucket = overrides
                    .bucket
                    .as_deref()
                    .filter(|b| !b.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| self.bucket.clone());
                let upload_options = match &overrides.upload_options {
                    Some(options) => self.upload_options.merged(options),
                    None => self.upload_options.clone(),
                };
                Some(PersistDirective {
                    bucket,
                    upload_options,
                })
            }
        }
    }
}

/// Fields a caller may override in a structured `x-persist` directive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_options: Option<UploadOptions>,
}

/// Persistence request carried by one HTTP call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PersistRequest {
    #[default]
    None,
    Requested,
    WithOptions(PersistOverrides),
}

impl From<bool> for PersistRequest {
    fn from(requested: bool) -> Self {
        if requested {
            PersistRequest::Requested
        } else {
            PersistRequest::None
        }
    }
}

impl From<PersistOverrides> for PersistRequest {
    fn from(overrides: PersistOverrides) -> Self {
        PersistRequest::WithOptions(overrides)
    }
}

impl PersistRequest {
    /// Decode the `x-persist` header
    ///
    /// `"0"`/`"false"`/empty mean no request; a value starting with `{` is a
    /// JSON directive; anything else is a plain request. A malformed JSON
    /// directive is dropped with a warning.
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        let Some(raw) = value.and_then(|v| v.to_str().ok()).map(str::trim) else {
            return PersistRequest::None;
        };

        match raw {
            "" | "0" | "false" => PersistRequest::None,
            json if json.starts_with('{') => match serde_json::from_str(json) {
                Ok(overrides) => PersistRequest::WithOptions(overrides),
                Err(e) => {
                    warn!("Ignoring malformed x-persist directive: {}", e);
                    PersistRequest::None
                }
            },
            _ => PersistRequest::Requested,
        }
    }

    /// Encode for the `x-persist` header; `None` means omit the header
    pub fn to_header(&self) -> Result<Option<HeaderValue>, CoreError> {
        match self {
            PersistRequest::None => Ok(None),
            PersistRequest::Requested => Ok(Some(HeaderValue::from_static("1"))),
            PersistRequest::WithOptions(overrides) => {
                let json = serde_json::to_string(overrides).map_err(|e| {
                    CoreError::Configuration(format!("Unencodable persist directive: {}", e))
                })?;
                HeaderValue::from_str(&json).map(Some).map_err(|e| {
                    CoreError::Configuration(format!("Persist directive is not a header: {}", e))
                })
            }
        }
    }
}

/// Fully resolved persistence target for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistDirective {
    pub bucket: String,
    pub upload_options: UploadOptions,
}
