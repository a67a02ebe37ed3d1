//! Wire types consumed from the board API. Read-only inputs except for the
//! upsert/patch payloads.

use serde::{Deserialize, Serialize};

/// A topic as listed by `GET /topics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub updated_at_ms: Option<u64>,
}

/// A task within a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub topic_id: String,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated_at_ms: Option<u64>,
}

/// A single board log entry as returned by `GET /log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub speaker_label: Option<String>,
    pub created_at_ms: u64,
    #[serde(default)]
    pub session_key: Option<String>,
}

/// A curated note attached to a prior log entry. High-weight retrieval bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub related_log_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub weight: f32,
}

/// Topic hit from `GET /search`, with hybrid relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredTopic {
    #[serde(flatten)]
    pub topic: Topic,
    pub score: f32,
    #[serde(default)]
    pub note_weight: Option<f32>,
}

/// Task hit from `GET /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredTask {
    #[serde(flatten)]
    pub task: Task,
    pub score: f32,
    #[serde(default)]
    pub note_weight: Option<f32>,
}

/// Log hit from `GET /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredLog {
    #[serde(flatten)]
    pub entry: LogEntry,
    pub score: f32,
}

/// The combined result set from `GET /search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub topics: Vec<ScoredTopic>,
    pub tasks: Vec<ScoredTask>,
    pub logs: Vec<ScoredLog>,
    pub notes: Vec<Note>,
}

/// Payload for `POST /topics` (insert or update by name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicUpsert {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
