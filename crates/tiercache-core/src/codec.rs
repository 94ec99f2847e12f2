//! Cache protocol codec
//!
//! Maps the entry model onto HTTP: the headers both sides exchange, the
//! cache headers the edge cache keys its retention on, and how a status
//! code classifies for each operation.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use http::header::{CACHE_CONTROL, CONTENT_TYPE, DATE, EXPIRES};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::entry::{Entry, FALLBACK_CONTENT_TYPE};
use crate::error::CoreError;

/// Request: negative-cache TTL override for a miss
pub const X_MISS_TTL: HeaderName = HeaderName::from_static("x-miss-ttl");
/// Request: persistence request (`1` or JSON directive)
pub const X_PERSIST: HeaderName = HeaderName::from_static("x-persist");
/// Request: marks a non-POST request as a delete
pub const X_DELETE: HeaderName = HeaderName::from_static("x-delete");
/// Request: ask for a gzip-encoded response
pub const X_GZIP: HeaderName = HeaderName::from_static("x-gzip");
/// Response: relative expiry consumed by the edge cache
pub const X_ACCEL_EXPIRES: HeaderName = HeaderName::from_static("x-accel-expires");

/// Retention after a delete; short but non-zero so the edge cache overwrites
/// its copy instead of treating the response as uncacheable
pub const DELETE_EXPIRY_SECS: u64 = 1;

/// Value of the `Server` header
pub const SERVER_IDENT: &str = concat!("tiercache/", env!("CARGO_PKG_VERSION"));

pub fn server_header() -> HeaderValue {
    HeaderValue::from_static(SERVER_IDENT)
}

/// Whether a request asks for a delete; an empty `x-delete` does not count
pub fn is_delete_request(headers: &HeaderMap) -> bool {
    headers.get(X_DELETE).is_some_and(|value| !value.is_empty())
}

/// Format a timestamp as an HTTP date (RFC 7231 IMF-fixdate)
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Write the headers that make the edge cache keep a response for `ttl`
/// seconds
///
/// A zero TTL writes nothing, leaving retention to the edge cache's own
/// defaults.
pub fn apply_ttl_headers(headers: &mut HeaderMap, ttl: u64, now: DateTime<Utc>) {
    if ttl == 0 {
        return;
    }

    let expires = i64::try_from(ttl)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    if let Ok(value) = HeaderValue::from_str(&http_date(now)) {
        headers.insert(DATE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(expires)) {
        headers.insert(EXPIRES, value);
    }
    headers.insert(X_ACCEL_EXPIRES, HeaderValue::from(ttl));
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", ttl)) {
        headers.insert(CACHE_CONTROL, value);
    }
}

/// Recover the TTL a response was issued with
///
/// Looks at `cache-control: max-age`, then `x-accel-expires`, then the
/// `expires`/`date` pair.
pub fn ttl_from_headers(headers: &HeaderMap) -> Option<u64> {
    let header_str = |name: &HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    let max_age = header_str(&CACHE_CONTROL).and_then(|cc| {
        cc.split(',')
            .filter_map(|directive| directive.trim().strip_prefix("max-age="))
            .find_map(|secs| secs.trim().parse::<u64>().ok())
    });
    if max_age.is_some() {
        return max_age;
    }

    if let Some(secs) = header_str(&X_ACCEL_EXPIRES).and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(secs);
    }

    let date = header_str(&DATE).and_then(parse_http_date)?;
    let expires = header_str(&EXPIRES).and_then(parse_http_date)?;
    u64::try_from((expires - date).num_seconds()).ok()
}

/// Build an entry from a successful edge-cache response
///
/// `fallback_ttl` is used when the response carries no usable TTL.
pub fn entry_from_response(
    key: &str,
    headers: &HeaderMap,
    body: Bytes,
    fallback_ttl: u64,
) -> Result<Entry, CoreError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(FALLBACK_CONTENT_TYPE);

    let created_at = headers
        .get(DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
        .unwrap_or_else(Utc::now);

    let ttl = ttl_from_headers(headers)
        .filter(|ttl| *ttl > 0)
        .unwrap_or(fallback_ttl);

    Entry::with_created_at(key, body, content_type, ttl, created_at)
}

/// Client operations, for status classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Put,
    Delete,
}

/// How a response status reads for a given operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// Valid absence, not an error
    Absent,
    BadRequest,
    Unauthorized,
    RateLimited,
    InternalServerError,
    /// Anything not covered above
    Unclassified,
}

/// Classify a response status
pub fn classify(operation: Operation, status: StatusCode) -> ResponseClass {
    match status.as_u16() {
        400 => ResponseClass::BadRequest,
        403 => ResponseClass::Unauthorized,
        429 => ResponseClass::RateLimited,
        500 | 504 => ResponseClass::InternalServerError,
        code => match (operation, code) {
            (Operation::Get, 200) => ResponseClass::Success,
            (Operation::Get, 404 | 204) => ResponseClass::Absent,
            (Operation::Put, 200) => ResponseClass::Success,
            (Operation::Delete, 204) => ResponseClass::Success,
            _ => ResponseClass::Unclassified,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-05T08:09:10Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_http_date_roundtrip() {
        let now = fixed_now();
        let formatted = http_date(now);
        assert_eq!(formatted, "Tue, 05 Mar 2024 08:09:10 GMT");
        assert_eq!(parse_http_date(&formatted), Some(now));
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_delete_request_needs_a_value() {
        let mut headers = HeaderMap::new();
        assert!(!is_delete_request(&headers));

        headers.insert(X_DELETE, HeaderValue::from_static(""));
        assert!(!is_delete_request(&headers));

        headers.insert(X_DELETE, HeaderValue::from_static("1"));
        assert!(is_delete_request(&headers));
    }

    #[test]
    fn test_ttl_headers() {
        let mut headers = HeaderMap::new();
        apply_ttl_headers(&mut headers, 120, fixed_now());

        assert_eq!(headers[X_ACCEL_EXPIRES], "120");
        assert_eq!(headers[CACHE_CONTROL], "public, max-age=120");
        assert_eq!(headers[DATE], "Tue, 05 Mar 2024 08:09:10 GMT");
        assert_eq!(headers[EXPIRES], "Tue, 05 Mar 2024 08:11:10 GMT");
        assert_eq!(ttl_from_headers(&headers), Some(120));
    }

    #[test]
    fn test_zero_ttl_writes_nothing() {
        let mut headers = HeaderMap::new();
        apply_ttl_headers(&mut headers, 0, fixed_now());
        assert!(headers.is_empty());
        assert_eq!(ttl_from_headers(&headers), None);
    }

    #[test]
    fn test_ttl_from_partial_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(X_ACCEL_EXPIRES, HeaderValue::from_static("33"));
        assert_eq!(ttl_from_headers(&headers), Some(33));

        let mut headers = HeaderMap::new();
        headers.insert(DATE, HeaderValue::from_static("Tue, 05 Mar 2024 08:09:10 GMT"));
        headers.insert(EXPIRES, HeaderValue::from_static("Tue, 05 Mar 2024 08:09:40 GMT"));
        assert_eq!(ttl_from_headers(&headers), Some(30));

        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-transform, max-age=9"));
        assert_eq!(ttl_from_headers(&headers), Some(9));
    }

    #[test]
    fn test_entry_from_response() {
        let mut headers = HeaderMap::new();
        apply_ttl_headers(&mut headers, 15, fixed_now());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let entry = entry_from_response("k", &headers, Bytes::from_static(b"{}"), 60).unwrap();
        assert_eq!(entry.ttl, 15);
        assert_eq!(entry.content_type, "application/json");
        assert_eq!(entry.created_at, fixed_now());

        let entry = entry_from_response("k", &HeaderMap::new(), Bytes::new(), 60).unwrap();
        assert_eq!(entry.ttl, 60);
        assert_eq!(entry.content_type, FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn test_classify_get() {
        let get = |code| classify(Operation::Get, StatusCode::from_u16(code).unwrap());
        assert_eq!(get(200), ResponseClass::Success);
        assert_eq!(get(404), ResponseClass::Absent);
        assert_eq!(get(204), ResponseClass::Absent);
        assert_eq!(get(400), ResponseClass::BadRequest);
        assert_eq!(get(403), ResponseClass::Unauthorized);
        assert_eq!(get(429), ResponseClass::RateLimited);
        assert_eq!(get(500), ResponseClass::InternalServerError);
        assert_eq!(get(504), ResponseClass::InternalServerError);
        assert_eq!(get(502), ResponseClass::Unclassified);
        assert_eq!(get(301), ResponseClass::Unclassified);
    }

    #[test]
    fn test_classify_writes() {
        assert_eq!(classify(Operation::Put, StatusCode::OK), ResponseClass::Success);
        assert_eq!(
            classify(Operation::Put, StatusCode::NOT_FOUND),
            ResponseClass::Unclassified
        );
        assert_eq!(
            classify(Operation::Put, StatusCode::NO_CONTENT),
            ResponseClass::Unclassified
        );
        assert_eq!(
            classify(Operation::Delete, StatusCode::NO_CONTENT),
            ResponseClass::Success
        );
        assert_eq!(
            classify(Operation::Delete, StatusCode::OK),
            ResponseClass::Unclassified
        );
    }
}
