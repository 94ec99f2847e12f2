//! Key/value client

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tiercache_core::codec::{
    self, Operation, ResponseClass, X_DELETE, X_GZIP, X_MISS_TTL, X_PERSIST,
};
use tiercache_core::entry::FALLBACK_CONTENT_TYPE;
use tiercache_core::record::{CONTENT_TYPE_FIELD, TTL_FIELD, VALUE_FIELD};
use tiercache_core::{Entry, MemoryCacheConfig, MemoryDirective, MemoryTier, PersistRequest};
use tracing::{debug, info};
use url::Url;

use crate::error::RequestError;

/// TTL assumed for a 200 that carries no cache headers
const DEFAULT_FALLBACK_TTL: u64 = 60;

const USER_AGENT: &str = concat!("tiercache-client/", env!("CARGO_PKG_VERSION"));

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the edge cache
    pub server: String,
    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
    pub memory: MemoryCacheConfig,
    /// Ask for compressed responses
    pub gzip: bool,
    /// Per-request transport timeout
    pub timeout: Option<Duration>,
    /// TTL for responses that carry none, seconds
    pub fallback_ttl: u64,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            headers: BTreeMap::new(),
            memory: MemoryCacheConfig::default(),
            gzip: false,
            timeout: None,
            fallback_ttl: DEFAULT_FALLBACK_TTL,
        }
    }
}

/// Per-call options for `get`
#[derive(Clone, Debug, Default)]
pub struct GetOptions {
    /// Headers layered over the configured defaults
    pub headers: HeaderMap,
    /// Negative-cache TTL the server should use if the key is absent
    pub miss_ttl: Option<u64>,
}

/// Per-call options for `put`
#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    /// Extra fields merged into the write body
    pub extra: Map<String, Value>,
}

/// Per-call options for `delete`
#[derive(Clone, Debug, Default)]
pub struct DeleteOptions {
    pub headers: HeaderMap,
}

/// Client for a tiercache server behind an edge cache
pub struct KeyValClient {
    base: Url,
    client: Client,
    headers: HeaderMap,
    memory_config: MemoryCacheConfig,
    memory: MemoryTier,
    gzip: bool,
    fallback_ttl: u64,
}

impl KeyValClient {
    /// Create a new client
    ///
    /// Fails on an unusable server URL or default header.
    pub fn new(config: ClientConfig) -> Result<Self, RequestError> {
        let mut base = Url::parse(&config.server).map_err(|e| {
            RequestError::Configuration(format!("invalid server URL {:?}: {}", config.server, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(RequestError::Configuration(format!(
                "server URL must be http(s): {}",
                config.server
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let headers = header_map(&config.headers)?;

        let mut builder = Client::builder().user_agent(USER_AGENT).gzip(config.gzip);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        info!(
            "Created tiercache client for {} (memory tier: {})",
            base, config.memory.enabled
        );

        Ok(Self {
            base,
            client,
            headers,
            memory: MemoryTier::new(config.memory.max_entries),
            memory_config: config.memory,
            gzip: config.gzip,
            fallback_ttl: config.fallback_ttl,
        })
    }

    /// The client's memory tier
    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    /// Fetch an entry
    ///
    /// `Ok(None)` is a valid absence. A verified memory hit returns without
    /// touching the network.
    pub async fn get(
        &self,
        key: &str,
        options: GetOptions,
        memory: impl Into<MemoryDirective>,
        persist: impl Into<PersistRequest>,
    ) -> Result<Option<Entry>, RequestError> {
        let url = self.url_for(key)?;
        let policy = self.memory_config.resolve(&memory.into());

        if let Some(policy) = &policy
            && let Some(entry) = self.memory.lookup(key, policy.verify.as_ref())
        {
            debug!("GET {}: memory hit", key);
            return Ok(Some(entry));
        }

        let mut headers = self.request_headers(options.headers, &persist.into())?;
        if let Some(miss_ttl) = options.miss_ttl {
            headers.insert(X_MISS_TTL, HeaderValue::from(miss_ttl));
        }

        debug!("GET {}", url);
        let response = self.client.get(url).headers(headers).send().await?;
        let status = response.status();

        match codec::classify(Operation::Get, status) {
            ResponseClass::Success => {
                let response_headers = response.headers().clone();
                let body = response.bytes().await?;
                let entry =
                    codec::entry_from_response(key, &response_headers, body, self.fallback_ttl)?;

                // The edge copy may be well into its life already
                if let Some(policy) = &policy {
                    self.memory
                        .store(key, entry.clone(), policy.ttl_for(&entry, Utc::now()));
                }
                Ok(Some(entry))
            }
            ResponseClass::Absent => {
                debug!("GET {}: absent ({})", key, status);
                Ok(None)
            }
            class => Err(error_for(class, status, response).await),
        }
    }

    /// Write an entry
    ///
    /// String values are sent as-is, anything else as its JSON text. When the
    /// memory tier applies it is written before the request goes out.
    pub async fn put<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: u64,
        options: PutOptions,
        memory: impl Into<MemoryDirective>,
        persist: impl Into<PersistRequest>,
    ) -> Result<(), RequestError> {
        if ttl == 0 {
            return Err(RequestError::InvalidTtl);
        }
        let url = self.url_for(key)?;
        let value = value_text(value)?;

        if let Some(policy) = self.memory_config.resolve(&memory.into()) {
            let content_type = options
                .content_type
                .as_deref()
                .or_else(|| options.extra.get(CONTENT_TYPE_FIELD).and_then(Value::as_str))
                .unwrap_or(FALLBACK_CONTENT_TYPE);
            let entry = Entry::new(key, value.clone(), content_type, ttl)?;
            let memory_ttl = policy.ttl_for(&entry, entry.created_at);
            self.memory.store(key, entry, memory_ttl);
        }

        let mut body = options.extra;
        body.insert(VALUE_FIELD.to_string(), Value::String(value));
        body.insert(TTL_FIELD.to_string(), Value::from(ttl));
        if let Some(content_type) = options.content_type {
            body.insert(CONTENT_TYPE_FIELD.to_string(), Value::String(content_type));
        }

        let headers = self.request_headers(options.headers, &persist.into())?;

        debug!("POST {} (ttl {}s)", url, ttl);
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        match codec::classify(Operation::Put, status) {
            ResponseClass::Success => Ok(()),
            class => Err(error_for(class, status, response).await),
        }
    }

    /// Delete an entry from every tier
    ///
    /// The memory tier is purged first, even if the request then fails.
    pub async fn delete(
        &self,
        key: &str,
        options: DeleteOptions,
        persist: impl Into<PersistRequest>,
    ) -> Result<(), RequestError> {
        let url = self.url_for(key)?;
        self.memory.remove(key);

        let mut headers = self.request_headers(options.headers, &persist.into())?;
        headers.insert(X_DELETE, HeaderValue::from_static("1"));

        debug!("DELETE {}", url);
        let response = self.client.get(url).headers(headers).send().await?;
        let status = response.status();

        match codec::classify(Operation::Delete, status) {
            ResponseClass::Success => Ok(()),
            class => Err(error_for(class, status, response).await),
        }
    }

    /// `key` as a single escaped path segment under the base URL
    fn url_for(&self, key: &str) -> Result<Url, RequestError> {
        if key.is_empty() {
            return Err(RequestError::InvalidKey(key.to_string()));
        }

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RequestError::Configuration(format!("unusable base URL: {}", self.base)))?
            .pop_if_empty()
            .push(key);
        Ok(url)
    }

    /// Defaults, then call overrides, then protocol headers
    fn request_headers(
        &self,
        overrides: HeaderMap,
        persist: &PersistRequest,
    ) -> Result<HeaderMap, RequestError> {
        let mut headers = self.headers.clone();
        for (name, value) in overrides.iter() {
            headers.insert(name.clone(), value.clone());
        }

        if self.gzip {
            headers.insert(X_GZIP, HeaderValue::from_static("1"));
        }
        if let Some(value) = persist.to_header()? {
            headers.insert(X_PERSIST, value);
        }
        Ok(headers)
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, RequestError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            RequestError::Configuration(format!("invalid header name: {:?}", name))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            RequestError::Configuration(format!("invalid value for header {}", name))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn value_text<V: Serialize + ?Sized>(value: &V) -> Result<String, RequestError> {
    Ok(match serde_json::to_value(value)? {
        Value::String(text) => text,
        other => other.to_string(),
    })
}

async fn error_for(class: ResponseClass, status: StatusCode, response: Response) -> RequestError {
    let message = response.text().await.unwrap_or_default();

    match class {
        ResponseClass::BadRequest => RequestError::BadRequest(message),
        ResponseClass::Unauthorized => RequestError::Unauthorized,
        ResponseClass::RateLimited => RequestError::RateLimited,
        ResponseClass::InternalServerError => RequestError::InternalServerError {
            status: status.as_u16(),
            message,
        },
        ResponseClass::Success | ResponseClass::Absent | ResponseClass::Unclassified => {
            RequestError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(server: &str) -> KeyValClient {
        KeyValClient::new(ClientConfig::new(server)).unwrap()
    }

    #[test]
    fn test_base_url_normalisation() {
        let c = client("http://cache.internal:8080/kv");
        assert_eq!(
            c.url_for("greeting").unwrap().as_str(),
            "http://cache.internal:8080/kv/greeting"
        );

        let c = client("http://cache.internal:8080/kv/");
        assert_eq!(
            c.url_for("greeting").unwrap().as_str(),
            "http://cache.internal:8080/kv/greeting"
        );

        let c = client("http://cache.internal");
        assert_eq!(
            c.url_for("greeting").unwrap().as_str(),
            "http://cache.internal/greeting"
        );
    }

    #[test]
    fn test_keys_are_one_segment() {
        let c = client("http://cache.internal/");
        assert_eq!(
            c.url_for("a b/c?d").unwrap().as_str(),
            "http://cache.internal/a%20b%2Fc%3Fd"
        );
        assert!(matches!(c.url_for(""), Err(RequestError::InvalidKey(_))));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            KeyValClient::new(ClientConfig::new("not a url")),
            Err(RequestError::Configuration(_))
        ));
        assert!(matches!(
            KeyValClient::new(ClientConfig::new("ftp://cache.internal/")),
            Err(RequestError::Configuration(_))
        ));

        let mut config = ClientConfig::new("http://cache.internal/");
        config
            .headers
            .insert("bad header".to_string(), "v".to_string());
        assert!(matches!(
            KeyValClient::new(config),
            Err(RequestError::Configuration(_))
        ));
    }

    #[test]
    fn test_request_headers_layering() {
        let mut config = ClientConfig::new("http://cache.internal/");
        config
            .headers
            .insert("authorization".to_string(), "Bearer default".to_string());
        config
            .headers
            .insert("x-team".to_string(), "core".to_string());
        config.gzip = true;
        let c = KeyValClient::new(config).unwrap();

        let mut overrides = HeaderMap::new();
        overrides.insert("authorization", HeaderValue::from_static("Bearer call"));

        let headers = c
            .request_headers(overrides, &PersistRequest::Requested)
            .unwrap();
        assert_eq!(headers["authorization"], "Bearer call");
        assert_eq!(headers["x-team"], "core");
        assert_eq!(headers[X_GZIP], "1");
        assert_eq!(headers[X_PERSIST], "1");

        let headers = c
            .request_headers(HeaderMap::new(), &PersistRequest::None)
            .unwrap();
        assert!(!headers.contains_key(X_PERSIST));
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text("plain").unwrap(), "plain");
        assert_eq!(value_text(&42).unwrap(), "42");
        assert_eq!(
            value_text(&json!({"a": [1, true]})).unwrap(),
            r#"{"a":[1,true]}"#
        );
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected_before_io() {
        // Nothing listens here; reaching the network would be a transport error
        let c = client("http://127.0.0.1:9/");
        let err = c
            .put("k", "v", 0, PutOptions::default(), true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidTtl));
        assert!(c.memory().lookup("k", None).is_none());
    }

    #[tokio::test]
    async fn test_delete_purges_memory_even_when_request_fails() {
        let c = client("http://127.0.0.1:9/");
        let entry = Entry::new("k", "v", "text/plain", 60).unwrap();
        c.memory().store("k", entry, 60);

        let err = c
            .delete("k", DeleteOptions::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
        assert!(c.memory().lookup("k", None).is_none());
    }

    #[tokio::test]
    async fn test_put_memory_entry_takes_content_type_from_extra() {
        let c = client("http://127.0.0.1:9/");
        let mut extra = Map::new();
        extra.insert(CONTENT_TYPE_FIELD.to_string(), json!("application/json"));
        let options = PutOptions {
            extra,
            ..Default::default()
        };

        // The request fails, the optimistic memory write has already happened
        let err = c.put("k", "{}", 30, options, true, false).await.unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));

        let cached = c.memory().lookup("k", None).unwrap();
        assert_eq!(cached.content_type, "application/json");
        assert_eq!(cached.ttl, 30);
    }
}
