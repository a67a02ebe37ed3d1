//! The delivery pipeline: serialized sends, bounded immediate retries,
//! persisted fallback, and the background drain loop.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    tokio::{
        sync::{Mutex, Notify, mpsc},
        task::JoinHandle,
        time::{self, Duration, Instant, MissedTickBehavior},
    },
    tracing::{debug, error, info, warn},
};

use pinboard_common::{event::BoardEvent, now_ms};

use crate::{
    backoff::{self, CORRUPT_COOLDOWN_MS},
    store::QueueStore,
    suppress::WarnSuppressor,
};

/// Pending sends the channel holds before enqueueing applies backpressure.
const CHANNEL_CAPACITY: usize = 256;

/// One delivery attempt against the board. Implemented by the HTTP client
/// and by test fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, event: &BoardEvent, idempotency_key: &str) -> Result<()>;
}

#[async_trait]
impl Transport for pinboard_client::BoardClient {
    async fn deliver(&self, event: &BoardEvent, idempotency_key: &str) -> Result<()> {
        self.ingest(event, idempotency_key).await?;
        Ok(())
    }
}

/// Delivery tuning knobs.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Total immediate-retry window before falling back to storage.
    pub retry_window: Duration,
    /// Background drain cadence.
    pub drain_interval: Duration,
    /// Max persisted records retried per drain pass.
    pub drain_batch: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_window: Duration::from_secs(10),
            drain_interval: Duration::from_secs(2),
            drain_batch: 25,
        }
    }
}

struct Inner {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    config: DeliveryConfig,
    /// Guards against overlapping drains (ticker vs. opportunistic).
    draining: AtomicBool,
    /// Set once shutdown begins; an in-flight event stops retrying and goes
    /// straight to storage.
    stopping: AtomicBool,
    stop: Notify,
    suppressor: WarnSuppressor,
}

/// The durable delivery queue.
///
/// Callers enqueue without blocking on network I/O; one worker task executes
/// sends strictly in order, so storage writes from concurrent event sources
/// never race. Across restarts the database is the sole source of truth.
pub struct DeliveryQueue {
    inner: Arc<Inner>,
    /// Taken on shutdown so the worker sees the channel close and exits
    /// after finishing its in-flight event.
    tx: Mutex<Option<mpsc::Sender<BoardEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueue {
    /// Spawn the send worker and the drain ticker.
    pub fn start(
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        config: DeliveryConfig,
    ) -> Arc<Self> {
        let inner = Arc::new(Inner {
            store,
            transport,
            config,
            draining: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            stop: Notify::new(),
            suppressor: WarnSuppressor::default(),
        });

        let (tx, mut rx) = mpsc::channel::<BoardEvent>(CHANNEL_CAPACITY);

        let worker_inner = Arc::clone(&inner);
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                worker_inner.process(event).await;
            }
        });

        let ticker_inner = Arc::clone(&inner);
        let ticker = tokio::spawn(async move {
            // First sweep happens one full interval in; startup recovery is
            // the caller's explicit drain_now.
            let period = ticker_inner.config.drain_interval;
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => ticker_inner.drain().await,
                    _ = ticker_inner.stop.notified() => break,
                }
            }
        });

        Arc::new(Self {
            inner,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            ticker: Mutex::new(Some(ticker)),
        })
    }

    /// Enqueue an event for delivery. The event must already carry its
    /// idempotency key. Never returns an error to the caller; every failure
    /// mode funnels into retry or the persisted queue.
    pub async fn send(&self, event: BoardEvent) {
        let tx = self.tx.lock().await.clone();
        match tx {
            Some(tx) => {
                if tx.send(event).await.is_err() {
                    warn!("delivery worker stopped; event dropped");
                }
            },
            None => warn!("delivery queue shut down; event dropped"),
        }
    }

    /// Run one drain pass immediately. Used at startup and in tests.
    pub async fn drain_now(&self) {
        self.inner.drain().await;
    }

    /// Stop the ticker, then wait for the worker to finish. An event still
    /// inside its retry window is persisted rather than lost; queued sends
    /// behind it go to storage the same way. Persisted records are picked up
    /// on the next start.
    pub async fn shutdown(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
        self.inner.stop.notify_waiters();
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        // Closing the channel lets the worker drain what it already accepted
        // and exit on its own.
        drop(self.tx.lock().await.take());
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
        info!("delivery queue stopped");
    }
}

impl Inner {
    /// Deliver one event: bounded immediate retries, then persist.
    async fn process(&self, event: BoardEvent) {
        let Some(key) = event.idempotency_key.clone() else {
            error!("event missing idempotency key; refusing to send");
            return;
        };

        let deadline = Instant::now() + self.config.retry_window;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.transport.deliver(&event, &key).await {
                Ok(()) => {
                    debug!(key = %key, attempt, "event delivered");
                    // The board is reachable again; sweep the backlog now
                    // instead of waiting for the next tick.
                    if !self.stopping.load(Ordering::SeqCst) {
                        self.drain().await;
                    }
                    return;
                },
                Err(e) => {
                    if self.stopping.load(Ordering::SeqCst) {
                        self.persist(&event, &key, &e).await;
                        return;
                    }
                    let delay = backoff::immediate_delay(attempt);
                    if Instant::now() + delay >= deadline {
                        self.persist(&event, &key, &e).await;
                        return;
                    }
                    tokio::select! {
                        _ = time::sleep(delay) => {},
                        _ = self.stop.notified() => {
                            self.persist(&event, &key, &e).await;
                            return;
                        },
                    }
                },
            }
        }
    }

    /// Fall back to storage after the retry window is exhausted.
    async fn persist(&self, event: &BoardEvent, key: &str, cause: &anyhow::Error) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(key = %key, error = %e, "failed to serialize event; dropping");
                return;
            },
        };
        match self.store.insert_if_absent(key, &payload, now_ms() as i64).await {
            Ok(true) => {
                self.warn_coalesced(format!("board unreachable, event queued: {cause}"));
            },
            Ok(false) => {
                debug!(key = %key, "event already persisted");
            },
            Err(e) => {
                error!(key = %key, error = %e, "failed to persist event");
            },
        }
    }

    /// One drain pass over due records. Refuses to overlap a pass already
    /// in progress.
    async fn drain(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("drain already in progress, skipping");
            return;
        }
        let result = self.drain_due().await;
        self.draining.store(false, Ordering::SeqCst);
        if let Err(e) = result {
            self.warn_coalesced(format!("drain pass failed: {e}"));
        }
    }

    async fn drain_due(&self) -> Result<()> {
        let now = now_ms() as i64;
        let due = self.store.due(self.config.drain_batch, now).await?;
        if due.is_empty() {
            return Ok(());
        }
        debug!(count = due.len(), "draining persisted backlog");

        for record in due {
            let event = match serde_json::from_str::<BoardEvent>(&record.payload) {
                Ok(event) => event,
                Err(e) => {
                    // This record can never succeed; cool it down instead of
                    // burning a retry every cycle.
                    let next = now_ms() as i64 + CORRUPT_COOLDOWN_MS as i64;
                    self.store
                        .mark_retry(
                            record.id,
                            record.attempts + 1,
                            next,
                            &format!("corrupt payload: {e}"),
                        )
                        .await?;
                    warn!(id = record.id, error = %e, "corrupt queued payload, cooled down");
                    continue;
                },
            };

            match self
                .transport
                .deliver(&event, &record.idempotency_key)
                .await
            {
                Ok(()) => {
                    self.store.delete(record.id).await?;
                    info!(key = %record.idempotency_key, attempts = record.attempts, "queued event delivered");
                },
                Err(e) => {
                    let attempts = record.attempts + 1;
                    let next = now_ms() as i64 + backoff::drain_delay_ms(attempts) as i64;
                    self.store
                        .mark_retry(record.id, attempts, next, &e.to_string())
                        .await?;
                    self.warn_coalesced(format!("queued delivery failed: {e}"));
                },
            }
        }
        Ok(())
    }

    fn warn_coalesced(&self, message: String) {
        if let Some(suppressed) = self.suppressor.check(&message) {
            if suppressed > 0 {
                warn!(suppressed, "{message}");
            } else {
                warn!("{message}");
            }
        }
    }
}
