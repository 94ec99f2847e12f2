//! Write records
//!
//! A write record is the JSON object a writer POSTs: `{ value, ttl?,
//! content-type?, ...options }`. The same object, unchanged, is what goes to
//! the durable store, so the repair path validates it with exactly the rules
//! a live write goes through.

use bytes::Bytes;
use serde_json::{Map, Value};
use std::fmt;

use crate::config::KeyValSettings;
use crate::entry::{Entry, FALLBACK_CONTENT_TYPE};
use crate::error::CoreError;

/// Body field carrying the value
pub const VALUE_FIELD: &str = "value";
/// Body field carrying the TTL in seconds
pub const TTL_FIELD: &str = "ttl";
/// Body field carrying the content type
pub const CONTENT_TYPE_FIELD: &str = "content-type";

/// Rejection reasons for a write, rendered as the wire body of a 400
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// Body is not an object or has no string `value`
    NoData,
    /// No positive TTL in the body and no server default
    NoTtl,
}

impl RecordError {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordError::NoData => "no_data",
            RecordError::NoTtl => "no_ttl",
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for RecordError {}

/// A validated write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub value: String,
    pub ttl: u64,
    pub content_type: String,
    body: Map<String, Value>,
}

impl WriteRecord {
    /// Parse and validate a raw request body or stored blob
    pub fn parse(raw: &[u8], settings: &KeyValSettings) -> Result<Self, RecordError> {
        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(body)) => Self::from_object(body, settings),
            _ => Err(RecordError::NoData),
        }
    }

    /// Validate an already-decoded body
    pub fn from_object(
        body: Map<String, Value>,
        settings: &KeyValSettings,
    ) -> Result<Self, RecordError> {
        let value = match body.get(VALUE_FIELD) {
            Some(Value::String(value)) => value.clone(),
            _ => return Err(RecordError::NoData),
        };

        let ttl = body
            .get(TTL_FIELD)
            .and_then(parse_ttl)
            .or(settings.default_ttl.filter(|ttl| *ttl > 0))
            .ok_or(RecordError::NoTtl)?;

        let content_type = match body.get(CONTENT_TYPE_FIELD) {
            Some(Value::String(ct)) if !ct.is_empty() => ct.clone(),
            _ if !settings.default_content_type.is_empty() => {
                settings.default_content_type.clone()
            }
            _ => FALLBACK_CONTENT_TYPE.to_string(),
        };

        Ok(Self {
            value,
            ttl,
            content_type,
            body,
        })
    }

    /// The body exactly as the writer sent it, for the durable copy
    pub fn to_bytes(&self) -> Bytes {
        // Serializing a Map<String, Value> cannot fail
        Bytes::from(serde_json::to_vec(&self.body).unwrap_or_default())
    }

    /// Turn the record into an entry for `key`
    pub fn into_entry(self, key: &str) -> Result<Entry, CoreError> {
        Entry::new(key, self.value, self.content_type, self.ttl)
    }
}

/// Parse a positive TTL from a JSON number or numeric string
///
/// Fractional numbers are truncated; anything that ends up below one second
/// is rejected.
pub fn parse_ttl(value: &Value) -> Option<u64> {
    let ttl = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    ttl.filter(|ttl| *ttl > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(default_ttl: Option<u64>) -> KeyValSettings {
        KeyValSettings {
            default_ttl,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl(&json!(10)), Some(10));
        assert_eq!(parse_ttl(&json!("10")), Some(10));
        assert_eq!(parse_ttl(&json!(2.9)), Some(2));
        assert_eq!(parse_ttl(&json!(0)), None);
        assert_eq!(parse_ttl(&json!(-5)), None);
        assert_eq!(parse_ttl(&json!(0.5)), None);
        assert_eq!(parse_ttl(&json!("soon")), None);
        assert_eq!(parse_ttl(&json!(null)), None);
    }

    #[test]
    fn test_missing_value_is_no_data() {
        let s = settings(Some(60));
        assert_eq!(WriteRecord::parse(b"{}", &s), Err(RecordError::NoData));
        assert_eq!(
            WriteRecord::parse(br#"{"value": 5, "ttl": 10}"#, &s),
            Err(RecordError::NoData)
        );
        assert_eq!(WriteRecord::parse(b"not json", &s), Err(RecordError::NoData));
        assert_eq!(WriteRecord::parse(b"[1, 2]", &s), Err(RecordError::NoData));
    }

    #[test]
    fn test_ttl_falls_back_to_default() {
        let record = WriteRecord::parse(br#"{"value": "v"}"#, &settings(Some(60))).unwrap();
        assert_eq!(record.ttl, 60);

        let record =
            WriteRecord::parse(br#"{"value": "v", "ttl": "bad"}"#, &settings(Some(60))).unwrap();
        assert_eq!(record.ttl, 60);

        assert_eq!(
            WriteRecord::parse(br#"{"value": "v", "ttl": 0}"#, &settings(None)),
            Err(RecordError::NoTtl)
        );
        assert_eq!(
            WriteRecord::parse(br#"{"value": "v"}"#, &settings(Some(0))),
            Err(RecordError::NoTtl)
        );
    }

    #[test]
    fn test_content_type_resolution() {
        let s = KeyValSettings {
            default_content_type: "application/json".to_string(),
            ..settings(Some(5))
        };
        let record = WriteRecord::parse(br#"{"value": "v"}"#, &s).unwrap();
        assert_eq!(record.content_type, "application/json");

        let record =
            WriteRecord::parse(br#"{"value": "v", "content-type": "text/html"}"#, &s).unwrap();
        assert_eq!(record.content_type, "text/html");

        let s = KeyValSettings {
            default_content_type: String::new(),
            ..settings(Some(5))
        };
        let record = WriteRecord::parse(br#"{"value": "v"}"#, &s).unwrap();
        assert_eq!(record.content_type, FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn test_durable_bytes_keep_caller_options() {
        let raw = br#"{"value": "v", "ttl": 30, "source": "importer"}"#;
        let record = WriteRecord::parse(raw, &settings(None)).unwrap();

        let stored: Value = serde_json::from_slice(&record.to_bytes()).unwrap();
        assert_eq!(stored["source"], "importer");
        assert_eq!(stored["ttl"], 30);

        let replayed = WriteRecord::parse(&record.to_bytes(), &settings(None)).unwrap();
        assert_eq!(replayed, record);

        let entry = replayed.into_entry("k").unwrap();
        assert_eq!(entry.ttl, 30);
        assert_eq!(entry.value, "v");
    }
}
