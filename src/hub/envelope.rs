use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Event type names published by the task board handlers
pub struct EventType;

impl EventType {
    pub const TASK_CREATED: &'static str = "task_created";
    pub const TASK_UPDATED: &'static str = "task_updated";
    pub const TASK_DELETED: &'static str = "task_deleted";
    pub const TASK_ASSIGNED: &'static str = "task_assigned";
    pub const TASK_TRANSITIONED: &'static str = "task_transitioned";
    pub const COMMENT_ADDED: &'static str = "comment_added";
    pub const COMMENT_DELETED: &'static str = "comment_deleted";
}

/// Unit of data fanned out to every eligible session.
///
/// The timestamp is fixed when the hub accepts the publish, so all sessions
/// see the same instant for a given event. The topic only drives routing and
/// never reaches the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub topic: Option<String>,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            topic: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Serialize to the JSON text frame written to every session
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Opaque identity of one connected session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(EventType::TASK_CREATED, json!({"id": "t1", "title": "x"}))
            .with_topic("team-1");
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "task_created");
        assert_eq!(value["payload"], json!({"id": "t1", "title": "x"}));
        assert!(value["timestamp"].is_string());
        // routing topic stays server side
        assert!(value.get("topic").is_none());
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let envelope = Envelope::new(EventType::COMMENT_DELETED, json!({"id": "c1"}));
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        let parsed = DateTime::parse_from_rfc3339(value["timestamp"].as_str().unwrap()).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), envelope.timestamp);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(SessionId::from(a.as_str()), a);
    }
}
