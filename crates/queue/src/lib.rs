//! Durable delivery of board events.
//!
//! `send` attempts immediate delivery inside a bounded retry window and falls
//! back to a persisted queue; a background drain loop retries the backlog on
//! a fixed cadence. Storage is the sole source of truth across restarts.

pub mod backoff;
pub mod delivery;
pub mod store;
pub mod store_sqlite;
pub mod suppress;

pub use {
    delivery::{DeliveryConfig, DeliveryQueue, Transport},
    store::{QueueStore, QueuedRecord},
    store_sqlite::SqliteQueueStore,
    suppress::WarnSuppressor,
};

/// Run database migrations for the delivery queue.
///
/// Creates the `queued_records` table. Call once at startup before handing
/// the pool to [`SqliteQueueStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
