//! Outbound record shape accepted by event-stream sinks.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};

/// Record payload. Text when the inbound payload was valid UTF-8, raw bytes
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    Text(String),
    Binary(Vec<u8>),
}

impl RecordBody {
    /// Payload bytes as they will be sent.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RecordBody::Text(text) => text.as_bytes(),
            RecordBody::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RecordBody::Text(text) => Some(text),
            RecordBody::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

// JSON has no byte strings; binary bodies go out as base64 text.
impl Serialize for RecordBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordBody::Text(text) => serializer.serialize_str(text),
            RecordBody::Binary(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        }
    }
}

/// Application properties attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProperties {
    pub routing_key: String,
}

/// One record in an outbound batch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundRecord {
    pub body: RecordBody,
    pub properties: RecordProperties,
}

impl OutboundRecord {
    pub fn new(body: RecordBody, routing_key: impl Into<String>) -> Self {
        Self {
            body,
            properties: RecordProperties {
                routing_key: routing_key.into(),
            },
        }
    }

    pub fn routing_key(&self) -> &str {
        &self.properties.routing_key
    }

    /// Bytes this record contributes to a batch, excluding framing.
    pub fn payload_size(&self) -> usize {
        self.body.len() + self.properties.routing_key.len()
    }
}
