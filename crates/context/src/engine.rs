//! The retrieval engine: fast path through the board's aggregate endpoint,
//! manual aggregation as the fallback, all under one total time budget.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use {
    anyhow::Result,
    async_trait::async_trait,
    tokio::time::{Instant, timeout},
    tracing::debug,
};

use pinboard_client::{BoardClient, LogEntry, SearchResponse, Task, Topic};
use pinboard_text::{is_control_payload, summarize, truncate_chars};

use crate::{
    render::{self, ContextDraft},
    score,
};

/// Queries shorter than this are not worth a retrieval round trip.
const MIN_QUERY_CHARS: usize = 8;
/// How much session history the fallback pulls.
const SESSION_HISTORY_LIMIT: usize = 50;
/// Result cap passed to the hybrid search endpoint.
const SEARCH_LIMIT: usize = 20;
/// Recent logs fetched per kept topic.
const TOPIC_LOGS_LIMIT: usize = 10;
/// Memory lines kept per topic.
const TOPIC_MEMORY_LINES: usize = 3;
/// Conversation turns shown in the "recent turns" section.
const RECENT_TURNS_LIMIT: usize = 5;
/// One-line summary width for timeline and note lines.
const LINE_WIDTH: usize = 200;

/// Read-only board access the engine needs. [`BoardClient`] implements it;
/// tests substitute fakes.
#[async_trait]
pub trait BoardReader: Send + Sync {
    async fn context(&self, query: &str, session_key: &str) -> Result<Option<String>>;
    async fn search(&self, query: &str, limit: usize) -> Result<SearchResponse>;
    async fn topics(&self) -> Result<Vec<Topic>>;
    async fn tasks(&self, topic_id: Option<&str>) -> Result<Vec<Task>>;
    async fn logs(
        &self,
        session_key: Option<&str>,
        topic_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LogEntry>>;
}

#[async_trait]
impl BoardReader for BoardClient {
    async fn context(&self, query: &str, session_key: &str) -> Result<Option<String>> {
        Ok(BoardClient::context(self, query, session_key).await?)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<SearchResponse> {
        Ok(BoardClient::search(self, query, limit).await?)
    }

    async fn topics(&self) -> Result<Vec<Topic>> {
        Ok(BoardClient::topics(self).await?)
    }

    async fn tasks(&self, topic_id: Option<&str>) -> Result<Vec<Task>> {
        Ok(BoardClient::tasks(self, topic_id).await?)
    }

    async fn logs(
        &self,
        session_key: Option<&str>,
        topic_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        Ok(BoardClient::logs(self, session_key, topic_id, limit).await?)
    }
}

/// Retrieval tuning knobs.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub char_budget: usize,
    pub time_budget: Duration,
    pub topic_limit: usize,
    pub task_limit: usize,
    pub timeline_limit: usize,
    pub notes_per_entry: usize,
    pub notes_total: usize,
    pub min_topic_score: f32,
    pub ignore_session_prefixes: Vec<String>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            char_budget: 6000,
            time_budget: Duration::from_millis(4000),
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

/// One retrieval request: the new turn's text plus the resolved session key
/// and any upstream memory signals the host supplied.
#[derive(Debug, Clone, Copy)]
pub struct ContextRequest<'a> {
    pub query: &'a str,
    pub session_key: &'a str,
    pub signals: &'a [String],
}

/// Builds context blocks. Read-only, safe to share across in-flight turns.
pub struct ContextEngine {
    reader: Arc<dyn BoardReader>,
    options: ContextOptions,
}

fn degrade<T: Default>(result: Result<T>, source: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!(source, error = %e, "context source degraded to empty");
            T::default()
        },
    }
}

/// Ids in first-appearance order over `entries` (assumed newest first).
fn appearance_order(entries: &[LogEntry], pick: impl Fn(&LogEntry) -> Option<&str>) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for entry in entries {
        if let Some(id) = pick(entry) {
            if !order.iter().any(|seen| seen == id) {
                order.push(id.to_string());
            }
        }
    }
    order
}

fn dedup_key(entry: &LogEntry) -> String {
    match &entry.id {
        Some(id) => id.clone(),
        None => format!("{}:{}", entry.created_at_ms, entry.content),
    }
}

fn turn_line(entry: &LogEntry) -> String {
    let speaker = entry.speaker_label.as_deref().unwrap_or("unknown");
    format!("{speaker}: {}", summarize(&entry.content, LINE_WIDTH))
}

impl ContextEngine {
    pub fn new(reader: Arc<dyn BoardReader>, options: ContextOptions) -> Self {
        Self { reader, options }
    }

    /// Build a context block for a new agent turn, or decide it is not worth
    /// one. Never errors; every failure path degrades to `None`.
    pub async fn build_context(&self, request: ContextRequest<'_>) -> Option<String> {
        let query = request.query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            debug!("query too short for context retrieval");
            return None;
        }
        if is_control_payload(query) {
            debug!("control payload, skipping context retrieval");
            return None;
        }
        if self
            .options
            .ignore_session_prefixes
            .iter()
            .any(|prefix| request.session_key.starts_with(prefix.as_str()))
        {
            debug!(session_key = request.session_key, "session ignored for context");
            return None;
        }

        let deadline = Instant::now() + self.options.time_budget;

        match timeout(
            self.options.time_budget,
            self.reader.context(query, request.session_key),
        )
        .await
        {
            Ok(Ok(Some(block))) => {
                return Some(truncate_chars(&block, self.options.char_budget));
            },
            Ok(Ok(None)) => {},
            Ok(Err(e)) => debug!(error = %e, "aggregate context endpoint failed"),
            Err(_) => debug!("aggregate context endpoint timed out"),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match timeout(remaining, self.assemble(query, request)).await {
            Ok(draft) => render::render(&draft, self.options.char_budget),
            Err(_) => {
                debug!("fallback aggregation ran out of time budget");
                None
            },
        }
    }

    /// The manual aggregation path: fetch, score by max-fusion, render.
    async fn assemble(&self, query: &str, request: ContextRequest<'_>) -> ContextDraft {
        let (topics, session_logs, search) = tokio::join!(
            self.reader.topics(),
            self.reader
                .logs(Some(request.session_key), None, SESSION_HISTORY_LIMIT),
            self.reader.search(query, SEARCH_LIMIT),
        );
        let topics = degrade(topics, "topic list");
        let session_logs = degrade(session_logs, "session history");
        let search = degrade(search, "hybrid search");

        let topic_order = appearance_order(&session_logs, |e| e.topic_id.as_deref());
        let task_order = appearance_order(&session_logs, |e| e.task_id.as_deref());

        // Candidate topics: (topic, best score so far, seen in session).
        let mut candidates: HashMap<String, (Topic, f32, bool)> = HashMap::new();
        for topic in topics {
            let text = match &topic.description {
                Some(description) => format!("{} {description}", topic.name),
                None => topic.name.clone(),
            };
            let lexical = score::lexical_overlap(query, &text);
            candidates.insert(topic.id.clone(), (topic, lexical, false));
        }
        for hit in &search.topics {
            let semantic = hit.score + score::note_boost(hit.note_weight);
            let entry = candidates
                .entry(hit.topic.id.clone())
                .or_insert_with(|| (hit.topic.clone(), 0.0, false));
            entry.1 = entry.1.max(semantic);
        }
        for (position, topic_id) in topic_order.iter().enumerate() {
            if let Some(entry) = candidates.get_mut(topic_id) {
                entry.1 = entry.1.max(score::recency_boost(position));
                entry.2 = true;
            }
        }

        let mut kept: Vec<(Topic, f32)> = candidates
            .into_values()
            .filter(|(_, best, in_session)| *in_session || *best >= self.options.min_topic_score)
            .map(|(topic, best, _)| (topic, best))
            .collect();
        kept.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        kept.truncate(self.options.topic_limit);

        // Per kept topic: tasks and recent history.
        let mut scored_tasks: Vec<(Task, f32)> = Vec::new();
        let mut topic_memory: Vec<String> = Vec::new();
        for (topic, _) in &kept {
            let (tasks, topic_logs) = tokio::join!(
                self.reader.tasks(Some(&topic.id)),
                self.reader.logs(None, Some(&topic.id), TOPIC_LOGS_LIMIT),
            );
            for task in degrade(tasks, "topic tasks") {
                let lexical = score::lexical_overlap(query, &task.title);
                let semantic = search
                    .tasks
                    .iter()
                    .find(|hit| hit.task.id == task.id)
                    .map(|hit| hit.score + score::note_boost(hit.note_weight))
                    .unwrap_or(0.0);
                let recency = task_order
                    .iter()
                    .position(|id| *id == task.id)
                    .map(score::recency_boost)
                    .unwrap_or(0.0);
                scored_tasks.push((task, score::fuse(semantic, recency, lexical)));
            }
            for entry in degrade(topic_logs, "topic history")
                .iter()
                .take(TOPIC_MEMORY_LINES)
            {
                topic_memory.push(format!(
                    "{}: {}",
                    topic.name,
                    summarize(&entry.content, LINE_WIDTH)
                ));
            }
        }
        scored_tasks.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored_tasks.truncate(self.options.task_limit);

        // Timeline: conversation entries from both sources, deduplicated,
        // newest last.
        let mut timeline: Vec<LogEntry> = session_logs
            .iter()
            .filter(|entry| entry.kind == "conversation")
            .cloned()
            .collect();
        timeline.extend(
            search
                .logs
                .iter()
                .filter(|hit| hit.entry.kind == "conversation")
                .map(|hit| hit.entry.clone()),
        );
        let mut seen_entries: HashSet<String> = HashSet::new();
        timeline.retain(|entry| seen_entries.insert(dedup_key(entry)));
        timeline.sort_by_key(|entry| entry.created_at_ms);
        if timeline.len() > self.options.timeline_limit {
            timeline.drain(..timeline.len() - self.options.timeline_limit);
        }

        // Curated notes attached to surviving timeline entries.
        let timeline_ids: HashSet<&str> =
            timeline.iter().filter_map(|entry| entry.id.as_deref()).collect();
        let mut notes_per_entry: HashMap<&str, usize> = HashMap::new();
        let mut notes: Vec<String> = Vec::new();
        for note in &search.notes {
            if notes.len() >= self.options.notes_total {
                break;
            }
            let Some(related) = note.related_log_id.as_deref() else {
                continue;
            };
            if !timeline_ids.contains(related) {
                continue;
            }
            let attached = notes_per_entry.entry(related).or_insert(0);
            if *attached >= self.options.notes_per_entry {
                continue;
            }
            *attached += 1;
            notes.push(summarize(&note.content, LINE_WIDTH));
        }

        let mut recent_turns: Vec<String> = session_logs
            .iter()
            .filter(|entry| entry.kind == "conversation")
            .take(RECENT_TURNS_LIMIT)
            .map(turn_line)
            .collect();
        recent_turns.reverse();

        ContextDraft {
            intent: query.to_string(),
            signals: request.signals.to_vec(),
            recent_turns,
            topics: kept
                .iter()
                .map(|(topic, _)| match &topic.description {
                    Some(description) => {
                        format!("{} ({}): {}", topic.name, topic.id, summarize(description, LINE_WIDTH))
                    },
                    None => format!("{} ({})", topic.name, topic.id),
                })
                .collect(),
            tasks: scored_tasks
                .iter()
                .map(|(task, _)| {
                    let status = task.status.as_deref().unwrap_or("open");
                    format!("{} [{}/{}, {}]", task.title, task.topic_id, task.id, status)
                })
                .collect(),
            timeline: timeline.iter().map(turn_line).collect(),
            notes,
            topic_memory,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use pinboard_client::{Note, ScoredLog, ScoredTopic};

    use super::*;

    #[derive(Default)]
    struct FakeBoard {
        context_block: Option<String>,
        topics: Vec<Topic>,
        tasks: Vec<Task>,
        session_logs: Vec<LogEntry>,
        topic_logs: Vec<LogEntry>,
        search: SearchResponse,
        fail_topics: bool,
    }

    #[async_trait]
    impl BoardReader for FakeBoard {
        async fn context(&self, _query: &str, _session_key: &str) -> Result<Option<String>> {
            Ok(self.context_block.clone())
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<SearchResponse> {
            Ok(self.search.clone())
        }

        async fn topics(&self) -> Result<Vec<Topic>> {
            if self.fail_topics {
                anyhow::bail!("boom");
            }
            Ok(self.topics.clone())
        }

        async fn tasks(&self, topic_id: Option<&str>) -> Result<Vec<Task>> {
            Ok(self
                .tasks
                .iter()
                .filter(|task| topic_id.is_none_or(|id| task.topic_id == id))
                .cloned()
                .collect())
        }

        async fn logs(
            &self,
            session_key: Option<&str>,
            _topic_id: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<LogEntry>> {
            if session_key.is_some() {
                Ok(self.session_logs.clone())
            } else {
                Ok(self.topic_logs.clone())
            }
        }
    }

    fn topic(id: &str, name: &str, description: Option<&str>) -> Topic {
        Topic {
            id: id.into(),
            name: name.into(),
            description: description.map(str::to_string),
            updated_at_ms: None,
        }
    }

    fn task(id: &str, topic_id: &str, title: &str) -> Task {
        Task {
            id: id.into(),
            topic_id: topic_id.into(),
            title: title.into(),
            status: Some("open".into()),
            updated_at_ms: None,
        }
    }

    fn log(id: &str, topic_id: Option<&str>, content: &str, at: u64) -> LogEntry {
        LogEntry {
            id: Some(id.into()),
            topic_id: topic_id.map(str::to_string),
            task_id: None,
            kind: "conversation".into(),
            content: content.into(),
            speaker_label: Some("user".into()),
            created_at_ms: at,
            session_key: None,
        }
    }

    fn engine(board: FakeBoard) -> ContextEngine {
        ContextEngine::new(Arc::new(board), ContextOptions::default())
    }

    fn request<'a>(query: &'a str, session_key: &'a str) -> ContextRequest<'a> {
        ContextRequest {
            query,
            session_key,
            signals: &[],
        }
    }

    #[tokio::test]
    async fn short_query_yields_nothing() {
        let engine = engine(FakeBoard {
            context_block: Some("should not matter".into()),
            ..Default::default()
        });
        assert!(engine.build_context(request("hi", "board:topic:t1")).await.is_none());
    }

    #[tokio::test]
    async fn control_payload_yields_nothing() {
        let engine = engine(FakeBoard::default());
        let payload = r#"{"route": "topic", "confidence": 0.92}"#;
        assert!(engine.build_context(request(payload, "board:topic:t1")).await.is_none());
    }

    #[tokio::test]
    async fn ignored_session_prefix_yields_nothing() {
        let board = FakeBoard {
            context_block: Some("prebuilt".into()),
            ..Default::default()
        };
        let options = ContextOptions {
            ignore_session_prefixes: vec!["agent:cron".into()],
            ..Default::default()
        };
        let engine = ContextEngine::new(Arc::new(board), options);
        assert!(
            engine
                .build_context(request("a long enough query", "agent:cron:nightly"))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn aggregate_endpoint_takes_the_fast_path() {
        let engine = engine(FakeBoard {
            context_block: Some("prebuilt block".into()),
            // Would panic the fallback assertions if consulted.
            fail_topics: true,
            ..Default::default()
        });
        let block = engine
            .build_context(request("a long enough query", "board:topic:t1"))
            .await
            .unwrap();
        assert_eq!(block, "prebuilt block");
    }

    #[tokio::test]
    async fn fallback_fuses_signals_and_filters_weak_topics() {
        let board = FakeBoard {
            topics: vec![
                topic("t1", "staging deploys", Some("cluster deploy work")),
                topic("t2", "billing", Some("invoices")),
                topic("t3", "random", None),
            ],
            session_logs: vec![log("l1", Some("t3"), "earlier chatter", 100)],
            search: SearchResponse {
                topics: vec![ScoredTopic {
                    topic: topic("t2", "billing", Some("invoices")),
                    score: 0.5,
                    note_weight: None,
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let block = engine(board)
            .build_context(request("deploy the staging cluster", "board:topic:t1"))
            .await
            .unwrap();
        // t1 clears the bar lexically, t2 semantically, t3 only by recency.
        assert!(block.contains("staging deploys (t1)"));
        assert!(block.contains("billing (t2)"));
        assert!(block.contains("random (t3)"));
    }

    #[tokio::test]
    async fn weak_unseen_topics_are_dropped() {
        let board = FakeBoard {
            topics: vec![topic("t9", "totally unrelated", Some("nothing shared"))],
            ..Default::default()
        };
        let result = engine(board)
            .build_context(request("deploy the staging cluster", "board:topic:t1"))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn failing_source_degrades_instead_of_aborting() {
        let board = FakeBoard {
            fail_topics: true,
            search: SearchResponse {
                topics: vec![ScoredTopic {
                    topic: topic("t1", "staging deploys", None),
                    score: 0.8,
                    note_weight: None,
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let block = engine(board)
            .build_context(request("deploy the staging cluster", "board:topic:t1"))
            .await
            .unwrap();
        assert!(block.contains("staging deploys (t1)"));
    }

    #[tokio::test]
    async fn timeline_deduplicates_across_sources() {
        let shared = log("l1", Some("t1"), "shared entry", 100);
        let board = FakeBoard {
            topics: vec![topic("t1", "staging deploys", None)],
            session_logs: vec![shared.clone(), log("l2", Some("t1"), "only session", 200)],
            search: SearchResponse {
                logs: vec![ScoredLog {
                    entry: shared,
                    score: 0.9,
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let block = engine(board)
            .build_context(request("deploy the staging cluster", "board:topic:t1"))
            .await
            .unwrap();
        // The entry also shows up under "Recent turns"; the timeline itself
        // must list it once even though two sources supplied it.
        let timeline = &block[block.find("Timeline:").unwrap()..];
        assert_eq!(timeline.matches("shared entry").count(), 1);
    }

    #[tokio::test]
    async fn notes_are_capped_per_entry_and_total() {
        let mut notes = Vec::new();
        for i in 0..5 {
            notes.push(Note {
                id: format!("n{i}"),
                related_log_id: Some("l1".into()),
                content: format!("note {i}"),
                weight: 1.0,
            });
        }
        let board = FakeBoard {
            session_logs: vec![log("l1", Some("t1"), "the entry", 100)],
            search: SearchResponse {
                notes,
                ..Default::default()
            },
            ..Default::default()
        };
        let block = engine(board)
            .build_context(request("deploy the staging cluster", "board:topic:t1"))
            .await
            .unwrap();
        assert!(block.contains("note 0"));
        assert!(block.contains("note 1"));
        assert!(!block.contains("note 2"));
    }

    #[tokio::test]
    async fn tasks_are_scored_and_capped() {
        let board = FakeBoard {
            topics: vec![topic("t1", "staging deploys", Some("cluster deploy work"))],
            tasks: vec![
                task("42", "t1", "deploy staging cluster"),
                task("43", "t1", "unrelated paperwork"),
            ],
            ..Default::default()
        };
        let block = engine(board)
            .build_context(request("deploy the staging cluster", "board:topic:t1"))
            .await
            .unwrap();
        let deploy = block.find("deploy staging cluster [t1/42").unwrap();
        let paperwork = block.find("unrelated paperwork [t1/43").unwrap();
        assert!(deploy < paperwork);
    }

    #[tokio::test]
    async fn output_respects_char_budget() {
        let mut session_logs = Vec::new();
        for i in 0..40 {
            session_logs.push(log(
                &format!("l{i}"),
                Some("t1"),
                &format!("a fairly long conversation line number {i} {}", "x".repeat(300)),
                i as u64,
            ));
        }
        let board = FakeBoard {
            topics: vec![topic("t1", "staging deploys", Some("cluster deploy work"))],
            session_logs,
            ..Default::default()
        };
        let options = ContextOptions {
            char_budget: 500,
            ..Default::default()
        };
        let engine = ContextEngine::new(Arc::new(board), options);
        let block = engine
            .build_context(request("deploy the staging cluster", "board:topic:t1"))
            .await
            .unwrap();
        assert!(block.chars().count() <= 500);
    }
}
