use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    thiserror::Error,
    tracing::debug,
};

use pinboard_common::event::BoardEvent;

use crate::types::{LogEntry, SearchResponse, Task, Topic, TopicUpsert};

/// Header carrying the event's idempotency key so the board can deduplicate
/// on its side as well.
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure: connect refused, DNS, timeout.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// The board answered with a non-success status.
    #[error("board returned {status}")]
    Status { status: u16 },
}

impl Error {
    /// Every client error is retryable from the queue's point of view; the
    /// distinction only matters for logging.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            Self::Request(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// HTTP client for the board API. Cheap to clone.
#[derive(Clone)]
pub struct BoardClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<Secret<String>>,
}

impl BoardClient {
    /// Build a client with the given per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(3)))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach a bearer token sent with every request.
    #[must_use]
    pub fn with_token(mut self, token: Option<Secret<String>>) -> Self {
        self.token = token;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Error::Status {
                status: status.as_u16(),
            })
        }
    }

    /// Record one event. The idempotency key travels as a header so replays
    /// collapse server-side too.
    pub async fn ingest(&self, event: &BoardEvent, idempotency_key: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, "/log")
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(event)
            .send()
            .await?;
        Self::check(response).await?;
        debug!(key = idempotency_key, kind = event.kind.as_str(), "event ingested");
        Ok(())
    }

    /// Recent log entries, optionally scoped to a session or topic.
    pub async fn logs(
        &self,
        session_key: Option<&str>,
        topic_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(key) = session_key {
            query.push(("session_key", key.to_string()));
        }
        if let Some(id) = topic_id {
            query.push(("topic_id", id.to_string()));
        }
        let response = self
            .request(reqwest::Method::GET, "/log")
            .query(&query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn topics(&self) -> Result<Vec<Topic>> {
        let response = self.request(reqwest::Method::GET, "/topics").send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn topic(&self, id: &str) -> Result<Topic> {
        let response = self
            .request(reqwest::Method::GET, &format!("/topics/{id}"))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Tasks, optionally filtered to one topic.
    pub async fn tasks(&self, topic_id: Option<&str>) -> Result<Vec<Task>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(id) = topic_id {
            query.push(("topic_id", id.to_string()));
        }
        let response = self
            .request(reqwest::Method::GET, "/tasks")
            .query(&query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn task(&self, id: &str) -> Result<Task> {
        let response = self
            .request(reqwest::Method::GET, &format!("/tasks/{id}"))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Hybrid relevance search across topics, tasks, logs, and notes.
    pub async fn search(&self, query_text: &str, limit: usize) -> Result<SearchResponse> {
        let response = self
            .request(reqwest::Method::GET, "/search")
            .query(&[("q", query_text), ("limit", &limit.to_string())])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// The board's pre-assembled context block, when it has one.
    pub async fn context(&self, query_text: &str, session_key: &str) -> Result<Option<String>> {
        #[derive(Deserialize)]
        struct ContextResponse {
            #[serde(default)]
            context: Option<String>,
        }

        let response = self
            .request(reqwest::Method::GET, "/context")
            .query(&[("q", query_text), ("session_key", session_key)])
            .send()
            .await?;
        let body: ContextResponse = Self::check(response).await?.json().await?;
        Ok(body.context.filter(|c| !c.trim().is_empty()))
    }

    pub async fn upsert_topic(&self, upsert: &TopicUpsert) -> Result<Topic> {
        let response = self
            .request(reqwest::Method::POST, "/topics")
            .json(upsert)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Partial task update (status, title).
    pub async fn update_task(&self, id: &str, patch: &serde_json::Value) -> Result<Task> {
        let response = self
            .request(reqwest::Method::PATCH, &format!("/tasks/{id}"))
            .json(patch)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
