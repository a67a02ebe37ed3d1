//! Config schema types (board endpoint, delivery queue, scope, context).

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinboardConfig {
    pub board: BoardConfig,
    pub delivery: DeliveryConfig,
    pub scope: ScopeConfig,
    pub context: ContextConfig,
}

/// Remote board service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Base URL of the board HTTP API.
    pub url: String,
    /// Bearer token sent with every request, when configured.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    /// Per-request timeout. Independent of retry windows and time budgets.
    pub request_timeout_secs: u64,
}

// `Secret<String>` hides its value from derived `Serialize`; expose it
// explicitly for config round-trips.
fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:4700".into(),
            token: None,
            request_timeout_secs: 5,
        }
    }
}

/// Durable delivery queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Total window for immediate-send retries before falling back to the
    /// persisted queue.
    pub retry_window_secs: u64,
    /// Cadence of the background drain loop.
    pub drain_interval_secs: u64,
    /// Maximum persisted records retried per drain pass.
    pub drain_batch: u32,
    /// Queue database path. Defaults to `<data_dir>/pinboard/queue.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_db: Option<PathBuf>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_window_secs: 10,
            drain_interval_secs: 2,
            drain_batch: 25,
            queue_db: None,
        }
    }
}

/// Session scope cache behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Scope freshness window, measured from last refresh.
    pub ttl_secs: u64,
    /// When true, unscoped sessions route to a deterministic per-session
    /// topic instead of staying unassigned.
    pub auto_topic: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            auto_topic: false,
        }
    }
}

/// Context retrieval budgets and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub enabled: bool,
    /// Hard cap on the assembled context block, in characters.
    pub char_budget: usize,
    /// Hard cap on total retrieval time.
    pub time_budget_ms: u64,
    pub topic_limit: usize,
    pub task_limit: usize,
    pub timeline_limit: usize,
    pub notes_per_entry: usize,
    pub notes_total: usize,
    /// Candidate topics below this score are dropped unless seen in the
    /// session's recent history.
    pub min_topic_score: f32,
    /// Sessions whose resolved key starts with any of these prefixes never
    /// get a context block.
    pub ignore_session_prefixes: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            char_budget: 6000,
            time_budget_ms: 4000,
            topic_limit: 5,
            task_limit: 3,
            timeline_limit: 20,
            notes_per_entry: 2,
            notes_total: 10,
            min_topic_score: 0.35,
            ignore_session_prefixes: Vec::new(),
        }
    }
}
