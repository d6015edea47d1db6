//! Queue record codec
//!
//! A queue record is a JSON object carrying the business tag, optional
//! headers and a body. Decoding never fails loudly: anything that is not a
//! well-formed record yields no event and the caller drops it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{SharedError, SharedResult};

/// Header key that carries the business name on every decoded event
pub const BUSINESS_HEADER: &str = "business";

/// One log event forwarded to a collector node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl LogEvent {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn business(&self) -> Option<&str> {
        self.headers.get(BUSINESS_HEADER).map(String::as_str)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordEnvelope {
    #[serde(default)]
    business: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    body: serde_json::Value,
}

/// Decode a raw queue payload into `(business, event)`
///
/// Malformed payloads return `None` for the event. A missing business tag
/// decodes to an empty name, which only the `default` route will accept.
pub fn decode_record(raw: &[u8]) -> (String, Option<LogEvent>) {
    let envelope = match serde_json::from_slice::<RecordEnvelope>(raw) {
        Ok(envelope) => envelope,
        Err(_) => return (String::new(), None),
    };

    let body = match envelope.body {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => return (envelope.business, None),
        other => other.to_string(),
    };

    let mut headers = envelope.headers;
    headers.insert(BUSINESS_HEADER.to_string(), envelope.business.clone());

    (envelope.business, Some(LogEvent { headers, body }))
}

/// Encode a record the way producers push it onto a queue
pub fn encode_record(business: &str, event: &LogEvent) -> SharedResult<Vec<u8>> {
    let mut headers = event.headers.clone();
    headers.remove(BUSINESS_HEADER);

    let envelope = RecordEnvelope {
        business: business.to_string(),
        headers,
        body: serde_json::Value::String(event.body.clone()),
    };

    serde_json::to_vec(&envelope).map_err(|e| SharedError::EncodingError {
        message: e.to_string(),
    })
}
