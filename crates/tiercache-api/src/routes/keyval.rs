//! Key/value routes
//!
//! One route serves every key. The edge cache in front of this server only
//! understands GET and POST, so a delete travels as a GET carrying
//! `x-delete`; its 204 then overwrites whatever the edge cache held.

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use bytes::Bytes;
use chrono::Utc;
use tiercache_core::codec::{DELETE_EXPIRY_SECS, apply_ttl_headers, is_delete_request};
use tiercache_core::{Entry, PersistDirective, PersistenceService, WriteRecord};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Create key/value routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/{key}", any(dispatch))
}

/// POST is a write, anything carrying a non-empty `x-delete` is a delete, the rest read
async fn dispatch(
    State(state): State<AppState>,
    Path(key): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if method == Method::POST {
        put_entry(&state, &key, &headers, &body)
    } else if is_delete_request(&headers) {
        Ok(delete_entry(&state, &key, &headers).await)
    } else {
        Ok(get_entry(&state, &key, &headers).await)
    }
}

// ==================== Read ====================

/// Only reached on an edge-cache miss
async fn get_entry(state: &AppState, key: &str, headers: &HeaderMap) -> Response {
    metrics::counter!("tiercache_requests_total", "op" => "get").increment(1);

    let miss_ttl = state.settings.miss_ttl_for(headers);

    if let Some((persistence, directive)) = state.persist_target(headers)
        && let Some(response) = repair(state, &persistence, key, &directive).await
    {
        return response;
    }

    debug!("GET {}: miss (negative ttl {}s)", key, miss_ttl);

    let mut response = StatusCode::NOT_FOUND.into_response();
    apply_ttl_headers(response.headers_mut(), miss_ttl, Utc::now());
    response
}

/// Read-through repair from the durable tier
///
/// A recovered record is replayed like a fresh write, minus persistence, so
/// the edge cache is repopulated with the record's own TTL. Any failure
/// leaves the request a plain miss.
async fn repair(
    state: &AppState,
    persistence: &PersistenceService,
    key: &str,
    directive: &PersistDirective,
) -> Option<Response> {
    let record = match persistence.recover(key, directive, &state.settings).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            metrics::counter!("tiercache_repair_total", "outcome" => "absent").increment(1);
            return None;
        }
        Err(e) => {
            metrics::counter!("tiercache_repair_total", "outcome" => "failed").increment(1);
            warn!("Repair of {}/{} failed: {}", directive.bucket, key, e);
            return None;
        }
    };

    match store_entry(state, key, &HeaderMap::new(), record, true) {
        Ok(response) => {
            metrics::counter!("tiercache_repair_total", "outcome" => "repaired").increment(1);
            info!("Repaired {} from {}", key, directive.bucket);
            Some(response)
        }
        Err(e) => {
            metrics::counter!("tiercache_repair_total", "outcome" => "failed").increment(1);
            warn!("Recovered record for {} could not be replayed: {}", key, e);
            None
        }
    }
}

// ==================== Write ====================

fn put_entry(
    state: &AppState,
    key: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    metrics::counter!("tiercache_requests_total", "op" => "put").increment(1);

    let record = WriteRecord::parse(body, &state.settings).inspect_err(|reason| {
        debug!("PUT {}: rejected ({})", key, reason);
    })?;

    debug!("PUT {}: {} bytes, ttl {}s", key, record.value.len(), record.ttl);
    store_entry(state, key, headers, record, false)
}

/// Answer with a validated record and schedule its durable copy
///
/// Shared by live writes and repair; repair passes `skip_persist` since the
/// record came from the durable tier in the first place.
fn store_entry(
    state: &AppState,
    key: &str,
    headers: &HeaderMap,
    record: WriteRecord,
    skip_persist: bool,
) -> Result<Response, ApiError> {
    let entry = record.clone().into_entry(key)?;
    let content_type = HeaderValue::from_str(&entry.content_type).map_err(|_| {
        ApiError::BadRequest(format!("invalid content type: {:?}", entry.content_type))
    })?;

    if !skip_persist && let Some((persistence, directive)) = state.persist_target(headers) {
        persistence.write_through(key, &record, &directive);
    }

    Ok(entry_response(&entry, content_type))
}

fn entry_response(entry: &Entry, content_type: HeaderValue) -> Response {
    let mut response = (StatusCode::OK, entry.value.clone()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    apply_ttl_headers(headers, entry.ttl, entry.created_at);
    response
}

// ==================== Delete ====================

async fn delete_entry(state: &AppState, key: &str, headers: &HeaderMap) -> Response {
    metrics::counter!("tiercache_requests_total", "op" => "delete").increment(1);

    if let Some((persistence, directive)) = state.persist_target(headers) {
        remove_durable(&persistence, key, &directive).await;
    }

    debug!("DELETE {}", key);

    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_ttl_headers(response.headers_mut(), DELETE_EXPIRY_SECS, Utc::now());
    response
}

/// Durable delete; failures never fail the request
async fn remove_durable(persistence: &PersistenceService, key: &str, directive: &PersistDirective) {
    match persistence.remove(key, directive).await {
        Ok(existed) => debug!(
            "Durable delete of {}/{} (existed: {})",
            directive.bucket, key, existed
        ),
        Err(e) => {
            metrics::counter!("tiercache_persist_failures_total", "op" => "delete").increment(1);
            warn!("Durable delete of {}/{} failed: {}", directive.bucket, key, e);
        }
    }
}
