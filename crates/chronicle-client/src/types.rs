//! Event and revision types exposed to applications

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Metadata key carrying the event type
pub const METADATA_TYPE: &str = "type";
/// Metadata key carrying the payload content type
pub const METADATA_CONTENT_TYPE: &str = "content-type";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// Optimistic concurrency check applied to an append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpectedRevision {
    /// No check
    #[default]
    Any,
    /// The stream must not exist yet
    NoStream,
    /// The stream must exist (any revision)
    StreamExists,
    /// The stream's last event must have exactly this revision
    Exact(u64),
}

impl ExpectedRevision {
    /// Decode the signed form used in error trailers
    pub fn from_wire(value: i64) -> Self {
        match value {
            -1 => ExpectedRevision::NoStream,
            -4 => ExpectedRevision::StreamExists,
            v if v >= 0 => ExpectedRevision::Exact(v as u64),
            _ => ExpectedRevision::Any,
        }
    }
}

impl fmt::Display for ExpectedRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedRevision::Any => f.write_str("any"),
            ExpectedRevision::NoStream => f.write_str("no stream"),
            ExpectedRevision::StreamExists => f.write_str("stream exists"),
            ExpectedRevision::Exact(r) => write!(f, "{}", r),
        }
    }
}

/// Revision a stream is actually at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentRevision {
    NoStream,
    Current(u64),
}

impl CurrentRevision {
    pub fn from_wire(value: i64) -> Self {
        if value < 0 {
            CurrentRevision::NoStream
        } else {
            CurrentRevision::Current(value as u64)
        }
    }
}

impl fmt::Display for CurrentRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentRevision::NoStream => f.write_str("no stream"),
            CurrentRevision::Current(r) => write!(f, "{}", r),
        }
    }
}

/// Position in the global log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub commit: u64,
    pub prepare: u64,
}

/// Outcome of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// Revision of the last appended event
    pub next_expected_revision: CurrentRevision,
    pub position: Option<Position>,
}

/// An event to be appended
#[derive(Debug, Clone)]
pub struct EventData {
    pub id: Uuid,
    pub event_type: String,
    pub content_type: String,
    pub data: Bytes,
    pub custom_metadata: Bytes,
}

impl EventData {
    /// JSON-encode `payload` as a new event
    pub fn json<T: Serialize>(event_type: impl Into<String>, payload: &T) -> crate::Result<Self> {
        let data = serde_json::to_vec(payload)?;
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            data: Bytes::from(data),
            custom_metadata: Bytes::new(),
        })
    }

    /// Opaque binary event
    pub fn binary(event_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            content_type: CONTENT_TYPE_BINARY.to_string(),
            data: data.into(),
            custom_metadata: Bytes::new(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_custom_metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.custom_metadata = metadata.into();
        self
    }
}

/// An event as stored by the server
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub stream_id: String,
    pub revision: u64,
    pub position: Position,
    pub event_type: String,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
    pub custom_metadata: Bytes,
    pub data: Bytes,
}

impl RecordedEvent {
    pub fn is_json(&self) -> bool {
        self.content_type == CONTENT_TYPE_JSON
    }

    /// Deserialize a JSON payload
    pub fn as_json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// An event read from a stream, with the link that led to it if any
#[derive(Debug, Clone)]
pub struct ResolvedEvent {
    pub event: Option<RecordedEvent>,
    pub link: Option<RecordedEvent>,
}

impl ResolvedEvent {
    /// The event that was read: the target if resolved, the link otherwise
    pub fn original_event(&self) -> Option<&RecordedEvent> {
        self.link.as_ref().or(self.event.as_ref())
    }

    /// The event the link points at, or the event itself
    pub fn get_event(&self) -> Option<&RecordedEvent> {
        self.event.as_ref().or(self.link.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_revision_from_wire() {
        assert_eq!(ExpectedRevision::from_wire(-1), ExpectedRevision::NoStream);
        assert_eq!(ExpectedRevision::from_wire(-2), ExpectedRevision::Any);
        assert_eq!(
            ExpectedRevision::from_wire(-4),
            ExpectedRevision::StreamExists
        );
        assert_eq!(ExpectedRevision::from_wire(12), ExpectedRevision::Exact(12));
    }

    #[test]
    fn test_current_revision_from_wire() {
        assert_eq!(CurrentRevision::from_wire(-1), CurrentRevision::NoStream);
        assert_eq!(CurrentRevision::from_wire(0), CurrentRevision::Current(0));
    }

    #[test]
    fn test_event_data_json() {
        #[derive(Serialize)]
        struct OrderPlaced {
            order_id: u32,
        }

        let event = EventData::json("OrderPlaced", &OrderPlaced { order_id: 7 }).unwrap();
        assert_eq!(event.event_type, "OrderPlaced");
        assert_eq!(event.content_type, CONTENT_TYPE_JSON);
        assert_eq!(&event.data[..], br#"{"order_id":7}"#);
    }

    #[test]
    fn test_resolved_event_link_precedence() {
        let recorded = |stream: &str| RecordedEvent {
            id: Uuid::nil(),
            stream_id: stream.to_string(),
            revision: 0,
            position: Position {
                commit: 0,
                prepare: 0,
            },
            event_type: "t".to_string(),
            content_type: CONTENT_TYPE_BINARY.to_string(),
            metadata: HashMap::new(),
            custom_metadata: Bytes::new(),
            data: Bytes::new(),
        };

        let resolved = ResolvedEvent {
            event: Some(recorded("target")),
            link: Some(recorded("$by-type")),
        };
        assert_eq!(resolved.original_event().unwrap().stream_id, "$by-type");
        assert_eq!(resolved.get_event().unwrap().stream_id, "target");
    }
}
