//! Publish endpoint used by the record mutation handlers.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::server::AppState;

/// Longest event type name accepted
const MAX_EVENT_TYPE_LEN: usize = 64;

#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Optional routing topic, only honoured by the `subscribed` delivery policy
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishEventResponse {
    /// False when the hub was saturated or stopped and the event was dropped
    pub accepted: bool,
    /// Timestamp carried by the broadcast envelope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PublishEventRequest {
    fn validate(&self) -> Result<()> {
        let event_type = self.event_type.trim();
        if event_type.is_empty() {
            return Err(AppError::Validation("event type must not be empty".into()));
        }
        if event_type.len() > MAX_EVENT_TYPE_LEN {
            return Err(AppError::Validation(format!(
                "event type longer than {} characters",
                MAX_EVENT_TYPE_LEN
            )));
        }
        if matches!(&self.topic, Some(topic) if topic.is_empty()) {
            return Err(AppError::Validation("topic must not be empty".into()));
        }
        Ok(())
    }
}

/// Hand an event to the hub. Delivery is best effort, so the response only
/// says whether the hub accepted the event, never how fan-out went.
#[tracing::instrument(
    name = "http.publish_event",
    skip(state, request),
    fields(event_type = %request.event_type)
)]
pub async fn publish_event(
    State(state): State<AppState>,
    Json(request): Json<PublishEventRequest>,
) -> Result<(StatusCode, Json<PublishEventResponse>)> {
    request.validate()?;

    let PublishEventRequest {
        event_type,
        payload,
        topic,
    } = request;

    let timestamp = match topic {
        Some(topic) => state.hub.publish_to(topic, event_type, payload),
        None => state.hub.publish(event_type, payload),
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishEventResponse {
            accepted: timestamp.is_some(),
            timestamp,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> PublishEventRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_request() {
        let req = request(json!({"type": "task_created", "payload": {"id": "t1"}}));
        assert!(req.validate().is_ok());
        assert_eq!(req.payload, json!({"id": "t1"}));
        assert!(req.topic.is_none());
    }

    #[test]
    fn test_missing_payload_defaults_to_null() {
        let req = request(json!({"type": "task_deleted"}));
        assert!(req.payload.is_null());
    }

    #[test]
    fn test_invalid_requests() {
        assert!(request(json!({"type": "  "})).validate().is_err());
        assert!(request(json!({"type": "x".repeat(65)})).validate().is_err());
        assert!(request(json!({"type": "task_created", "topic": ""})).validate().is_err());
    }
}
