//! Event records.
//!
//! An event record is an owned, immutable snapshot of one asynchronous
//! notification: what happened (`kind`), what it concerns (`subject`, e.g. a
//! request URI or MQTT topic) and the raw bytes that came with it
//! (`payload`). Records are created inside native callbacks, which must copy
//! out of callback-owned memory before it is reclaimed, so a record never
//! borrows anything.

use serde::{Deserialize, Serialize, Serializer};

/// The kind of a subsystem event.
///
/// Wire names are stable SCREAMING_SNAKE_CASE strings so scripts can match
/// on them across firmware versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// HTTP server: a GET request was served.
    Get,
    /// HTTP server: a control POST was received.
    Post,
    /// HTTP server: a file upload was received.
    Upload,
    /// HTTP server: a file delete was requested.
    Delete,
    /// MQTT: the client connected to the broker.
    Connected,
    /// MQTT: the client lost its broker connection.
    Disconnected,
    /// MQTT: a subscribe request was acknowledged.
    Subscribed,
    /// MQTT: an unsubscribe request was acknowledged.
    Unsubscribed,
    /// MQTT: a publish was acknowledged.
    Published,
    /// MQTT: a message arrived on a subscribed topic.
    Data,
    /// MQTT: the client reported an error.
    Error,
}

impl EventKind {
    /// The stable wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Get => "GET",
            EventKind::Post => "POST",
            EventKind::Upload => "UPLOAD",
            EventKind::Delete => "DELETE",
            EventKind::Connected => "CONNECTED",
            EventKind::Disconnected => "DISCONNECTED",
            EventKind::Subscribed => "SUBSCRIBED",
            EventKind::Unsubscribed => "UNSUBSCRIBED",
            EventKind::Published => "PUBLISHED",
            EventKind::Data => "DATA",
            EventKind::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An owned snapshot of one asynchronous notification.
///
/// `subject` and `payload` are optional: an absent field means "not
/// applicable" for this event (an MQTT CONNECTED event has neither), which
/// is distinct from an empty payload. Once constructed, a present payload is
/// never implicitly null.
///
/// Payloads are arbitrary bytes. MQTT message bodies in particular are not
/// NUL-terminated at the source and must be copied length-bounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    /// What happened.
    #[serde(rename = "event")]
    pub kind: EventKind,

    /// Request URI, MQTT topic or target path, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Opaque payload bytes, when applicable. Serialized lossily as UTF-8
    /// under the `data` key for script consumption.
    #[serde(
        rename = "data",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_lossy"
    )]
    pub payload: Option<Vec<u8>>,
}

impl EventRecord {
    /// Create a record with neither subject nor payload.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            subject: None,
            payload: None,
        }
    }

    /// Attach a subject (request URI, topic, filename).
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a payload, copied into owned storage.
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// The payload decoded as UTF-8, replacing invalid sequences.
    pub fn payload_lossy(&self) -> Option<std::borrow::Cow<'_, str>> {
        self.payload.as_deref().map(String::from_utf8_lossy)
    }

    /// Render the record as the JSON object handed to the scripting runtime.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("event record serialization cannot fail")
    }
}

fn serialize_lossy<S: Serializer>(payload: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
    match payload {
        Some(bytes) => ser.serialize_str(&String::from_utf8_lossy(bytes)),
        None => ser.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(EventKind::Connected.as_str(), "CONNECTED");
        assert_eq!(EventKind::Data.as_str(), "DATA");
        assert_eq!(EventKind::Upload.as_str(), "UPLOAD");
        assert_eq!(
            serde_json::to_value(EventKind::Subscribed).unwrap(),
            serde_json::json!("SUBSCRIBED")
        );
    }

    #[test]
    fn test_record_to_json() {
        let record = EventRecord::new(EventKind::Data)
            .subject("sensors/temp")
            .payload(b"21.5".to_vec());

        assert_eq!(
            record.to_json(),
            serde_json::json!({
                "event": "DATA",
                "subject": "sensors/temp",
                "data": "21.5"
            })
        );
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let record = EventRecord::new(EventKind::Connected);
        assert_eq!(record.to_json(), serde_json::json!({ "event": "CONNECTED" }));
    }

    #[test]
    fn test_empty_payload_is_not_absent() {
        let record = EventRecord::new(EventKind::Upload).subject("/data.bin").payload(Vec::new());
        let json = record.to_json();
        assert_eq!(json["data"], serde_json::json!(""));
    }

    #[test]
    fn test_payload_lossy_on_arbitrary_bytes() {
        let record = EventRecord::new(EventKind::Data).payload(vec![0xff, 0xfe, b'a']);
        let text = record.payload_lossy().unwrap();
        assert!(text.ends_with('a'));
    }
}
