//! The outbound event model: what gets recorded on the board.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// What kind of board entry an event produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A human-visible conversation turn (user message or assistant reply).
    Conversation,
    /// An internal action: tool invocation, tool result, run outcome.
    Action,
    /// A curated annotation attached to a prior entry.
    Note,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Action => "action",
            Self::Note => "note",
        }
    }
}

/// Where an event came from: host identifiers carried for dedup and display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub session_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Upstream message id, when the host supplies one. Strongest dedup signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// A single outbound record. Immutable once constructed; the idempotency key
/// is stamped exactly once and carried through every retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_task_id: Option<String>,
    pub kind: EventKind,
    pub content: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Value>,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    pub speaker_id: String,
    pub speaker_label: String,
    pub source: SourceMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_strings() {
        assert_eq!(EventKind::Conversation.as_str(), "conversation");
        assert_eq!(EventKind::Action.as_str(), "action");
        assert_eq!(EventKind::Note.as_str(), "note");
    }

    #[test]
    fn event_serializes_without_absent_fields() {
        let event = BoardEvent {
            destination_topic_id: Some("t1".into()),
            destination_task_id: None,
            kind: EventKind::Conversation,
            content: "hello".into(),
            summary: "hello".into(),
            raw_payload: None,
            created_at_ms: 1000,
            speaker_id: "user".into(),
            speaker_label: "user".into(),
            source: SourceMeta {
                session_key: "board:topic:t1".into(),
                ..Default::default()
            },
            idempotency_key: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"destination_topic_id\":\"t1\""));
        assert!(!json.contains("destination_task_id"));
        assert!(!json.contains("idempotency_key"));

        let back: BoardEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, EventKind::Conversation);
        assert_eq!(back.source.session_key, "board:topic:t1");
    }
}
