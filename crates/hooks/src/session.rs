//! The logger session: one object owning every piece of connector state.
//!
//! Created once at host startup, torn down at shutdown. No module-level
//! singletons; handlers hold an `Arc` to the session.

use std::{sync::Arc, time::Duration};

use {anyhow::Context, tracing::info};

use {
    pinboard_client::BoardClient,
    pinboard_config::PinboardConfig,
    pinboard_context::{ContextEngine, ContextOptions},
    pinboard_queue::{DeliveryConfig, DeliveryQueue, SqliteQueueStore},
    pinboard_routing::ScopeCache,
};

/// Owns the scope cache, the delivery queue, and the context engine.
pub struct LoggerSession {
    pub(crate) scope_cache: Arc<ScopeCache>,
    pub(crate) queue: Arc<DeliveryQueue>,
    pub(crate) context: Option<Arc<ContextEngine>>,
}

fn context_options(config: &PinboardConfig) -> ContextOptions {
    let ctx = &config.context;
    ContextOptions {
        char_budget: ctx.char_budget,
        time_budget: Duration::from_millis(ctx.time_budget_ms),
        topic_limit: ctx.topic_limit,
        task_limit: ctx.task_limit,
        timeline_limit: ctx.timeline_limit,
        notes_per_entry: ctx.notes_per_entry,
        notes_total: ctx.notes_total,
        min_topic_score: ctx.min_topic_score,
        ignore_session_prefixes: ctx.ignore_session_prefixes.clone(),
    }
}

impl LoggerSession {
    /// Build every component from config, open the queue database, and
    /// immediately sweep any backlog left over from a previous run.
    pub async fn start(config: &PinboardConfig) -> anyhow::Result<Arc<Self>> {
        let client = BoardClient::new(
            &config.board.url,
            Duration::from_secs(config.board.request_timeout_secs),
        )?
        .with_token(config.board.token.clone());

        let db_path = pinboard_config::queue_db_path(config);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating queue directory {}", parent.display()))?;
        }
        let store = Arc::new(
            SqliteQueueStore::new(&format!("sqlite://{}?mode=rwc", db_path.display())).await?,
        );

        let queue = DeliveryQueue::start(
            store,
            Arc::new(client.clone()),
            DeliveryConfig {
                retry_window: Duration::from_secs(config.delivery.retry_window_secs),
                drain_interval: Duration::from_secs(config.delivery.drain_interval_secs),
                drain_batch: config.delivery.drain_batch,
            },
        );
        queue.drain_now().await;

        let scope_cache = Arc::new(ScopeCache::new(
            config.scope.ttl_secs * 1000,
            config.scope.auto_topic,
        ));

        let context = config.context.enabled.then(|| {
            Arc::new(ContextEngine::new(
                Arc::new(client.clone()),
                context_options(config),
            ))
        });

        info!(
            board = config.board.url,
            queue_db = %db_path.display(),
            context = config.context.enabled,
            "logger session started"
        );
        Ok(Arc::new(Self {
            scope_cache,
            queue,
            context,
        }))
    }

    /// Stop background work. Persisted records stay in the database for the
    /// next start.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        info!("logger session stopped");
    }
}
