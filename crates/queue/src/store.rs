//! Storage contract for persisted outbound records.

use async_trait::async_trait;

/// A persisted event awaiting delivery.
///
/// Inserted on first failed send, retried by the drain loop, deleted on the
/// first confirmed success. The unique idempotency key makes insertion
/// naturally deduplicating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRecord {
    /// Monotonic insertion id; drain order follows it.
    pub id: i64,
    pub idempotency_key: String,
    /// The serialized [`pinboard_common::event::BoardEvent`].
    pub payload: String,
    pub attempts: i64,
    pub next_attempt_at_ms: i64,
    pub last_error: Option<String>,
    pub created_at_ms: i64,
}

/// Persistence operations the delivery queue needs. The queue owns the
/// record lifecycle exclusively; nothing else writes this storage.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a record unless one with the same idempotency key exists.
    /// Returns true if a row was inserted.
    async fn insert_if_absent(
        &self,
        idempotency_key: &str,
        payload: &str,
        now_ms: i64,
    ) -> anyhow::Result<bool>;

    /// Records due for retry at `now_ms`, oldest insertion first.
    async fn due(&self, limit: u32, now_ms: i64) -> anyhow::Result<Vec<QueuedRecord>>;

    /// Remove a record after confirmed delivery.
    async fn delete(&self, id: i64) -> anyhow::Result<()>;

    /// Record a failed retry: bump the attempt count and push the next
    /// attempt forward.
    async fn mark_retry(
        &self,
        id: i64,
        attempts: i64,
        next_attempt_at_ms: i64,
        last_error: &str,
    ) -> anyhow::Result<()>;

    /// Number of persisted records, drained or not yet due included.
    async fn count(&self) -> anyhow::Result<u64>;
}
