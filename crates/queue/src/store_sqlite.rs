//! SQLite-backed queue store using sqlx.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::store::{QueueStore, QueuedRecord};

/// SQLite persistence for queued records.
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Create a store with its own connection pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to SQLite")?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> QueuedRecord {
    QueuedRecord {
        id: row.get("id"),
        idempotency_key: row.get("idempotency_key"),
        payload: row.get("payload"),
        attempts: row.get("attempts"),
        next_attempt_at_ms: row.get("next_attempt_at_ms"),
        last_error: row.get("last_error"),
        created_at_ms: row.get("created_at_ms"),
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert_if_absent(
        &self,
        idempotency_key: &str,
        payload: &str,
        now_ms: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO queued_records (idempotency_key, payload, attempts, next_attempt_at_ms, created_at_ms)
             VALUES (?, ?, 0, ?, ?)
             ON CONFLICT(idempotency_key) DO NOTHING",
        )
        .bind(idempotency_key)
        .bind(payload)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due(&self, limit: u32, now_ms: i64) -> Result<Vec<QueuedRecord>> {
        let rows = sqlx::query(
            "SELECT id, idempotency_key, payload, attempts, next_attempt_at_ms, last_error, created_at_ms
             FROM queued_records
             WHERE next_attempt_at_ms <= ?
             ORDER BY id ASC
             LIMIT ?",
        )
        .bind(now_ms)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM queued_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: i64,
        attempts: i64,
        next_attempt_at_ms: i64,
        last_error: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE queued_records SET attempts = ?, next_attempt_at_ms = ?, last_error = ? WHERE id = ?",
        )
        .bind(attempts)
        .bind(next_attempt_at_ms)
        .bind(last_error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queued_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store() -> SqliteQueueStore {
        SqliteQueueStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn insert_is_deduplicating() {
        let store = make_store().await;
        assert!(store.insert_if_absent("k1", "{}", 100).await.unwrap());
        assert!(!store.insert_if_absent("k1", "{}", 200).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn due_respects_next_attempt_and_order() {
        let store = make_store().await;
        store.insert_if_absent("k1", "a", 100).await.unwrap();
        store.insert_if_absent("k2", "b", 100).await.unwrap();
        store.insert_if_absent("k3", "c", 100).await.unwrap();

        // Push k2 into the future.
        let due = store.due(10, 100).await.unwrap();
        let k2 = due.iter().find(|r| r.idempotency_key == "k2").unwrap();
        store.mark_retry(k2.id, 1, 5000, "boom").await.unwrap();

        let due = store.due(10, 100).await.unwrap();
        let keys: Vec<&str> = due.iter().map(|r| r.idempotency_key.as_str()).collect();
        assert_eq!(keys, vec!["k1", "k3"]);

        // Oldest insertion first once k2 is due again.
        let due = store.due(10, 6000).await.unwrap();
        let keys: Vec<&str> = due.iter().map(|r| r.idempotency_key.as_str()).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
        let k2 = due.iter().find(|r| r.idempotency_key == "k2").unwrap();
        assert_eq!(k2.attempts, 1);
        assert_eq!(k2.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn due_honors_limit() {
        let store = make_store().await;
        for i in 0..5 {
            store
                .insert_if_absent(&format!("k{i}"), "{}", 100)
                .await
                .unwrap();
        }
        assert_eq!(store.due(2, 100).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = make_store().await;
        store.insert_if_absent("k1", "{}", 100).await.unwrap();
        let due = store.due(1, 100).await.unwrap();
        store.delete(due[0].id).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
