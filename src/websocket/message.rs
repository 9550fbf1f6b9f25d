use serde::Deserialize;

/// Longest topic id accepted in a subscribe/unsubscribe frame
const MAX_TOPIC_LEN: usize = 128;

/// Commands a client may send to the hub.
///
/// Anything that does not parse as one of the known shapes becomes
/// [`ControlFrame::Unknown`] and is ignored by the reader loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    Subscribe(String),
    Unsubscribe(String),
    Unknown,
}

/// Wire shape of client frames: `{"type":"subscribe","id":"team-1"}`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe { id: String },
    Unsubscribe { id: String },
}

impl ControlFrame {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe { id }) if is_valid_topic(&id) => Self::Subscribe(id),
            Ok(ClientMessage::Unsubscribe { id }) if is_valid_topic(&id) => Self::Unsubscribe(id),
            _ => Self::Unknown,
        }
    }
}

fn is_valid_topic(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_TOPIC_LEN
}
