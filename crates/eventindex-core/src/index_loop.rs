//! The index loop: one state machine for every backend.
//!
//! # Phase 1: HISTORICAL SYNC
//! Probe the chain tip, then fetch `[cursor, min(cursor + batch - 1, tip)]`
//! ranges until the cursor reaches the tip. Each range is pushed in order and
//! only then is the cursor advanced. On reaching the tip the cursor is marked
//! up to date and the phase exits.
//!
//! # Phase 2: LIVE POLL
//! Spawned together with phase 1. Every `poll_interval` it checks the handoff
//! flag; once set it fetches `[cursor, tip]` and advances the cursor. Errors
//! skip the tick and the same range is retried on the next one.
//!
//! Both phases stop when the cancellation token fires. When both have exited
//! their queue senders are dropped and the consumer sees end-of-stream.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{BackendAdapter, CallContext};
use crate::cursor::{CursorSnapshot, SyncCursor};
use crate::error::IndexerError;
use crate::indexer::{IndexerConfig, IndexerState};
use crate::policy::{sleep_or_cancel, RateLimiter, RetryPolicy};
use crate::queue::{self, EventReceiver, EventSender};

/// A chain event indexer bound to one backend.
pub struct Indexer<B: BackendAdapter> {
    config: Arc<IndexerConfig>,
    backend: Arc<B>,
    cursor: Arc<SyncCursor>,
}

impl<B: BackendAdapter> Indexer<B> {
    pub fn new(config: IndexerConfig, backend: B) -> Self {
        Self::with_shared_backend(config, Arc::new(backend))
    }

    /// Create an indexer over a backend that is shared with other owners.
    pub fn with_shared_backend(config: IndexerConfig, backend: Arc<B>) -> Self {
        Self {
            cursor: Arc::new(SyncCursor::new(config.start_height)),
            config: Arc::new(config),
            backend,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Shared handle to the sync cursor.
    pub fn cursor(&self) -> Arc<SyncCursor> {
        Arc::clone(&self.cursor)
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        self.cursor.snapshot()
    }

    pub fn state(&self) -> IndexerState {
        self.cursor.state()
    }

    /// Validate the configuration, start both phases and return the event queue.
    ///
    /// Does not block. Configuration errors are returned here and never
    /// mid-stream. Must be called from within a Tokio runtime, at most once
    /// per indexer.
    pub fn run(&self, cancel: CancellationToken) -> Result<EventReceiver, IndexerError> {
        self.config.validate()?;
        self.backend.validate_filter(&self.config.filter)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            IndexerError::Config("Indexer::run must be called from within a Tokio runtime".into())
        })?;
        if !self.cursor.begin() {
            return Err(IndexerError::Config(format!(
                "indexer '{}' has already been started",
                self.config.id
            )));
        }

        // Child token: a failed phase stops its sibling without touching the caller's token.
        let cancel = cancel.child_token();
        let (sender, receiver) = queue::channel(self.config.queue_capacity, cancel.clone());
        let limiter = Arc::new(RateLimiter::new(self.config.rate_limiter_config()));
        let worker = SyncWorker {
            cx: CallContext::new(cancel.clone(), limiter),
            retry: RetryPolicy::new(self.config.retry_config()),
            config: Arc::clone(&self.config),
            backend: Arc::clone(&self.backend),
            cursor: Arc::clone(&self.cursor),
            queue: sender,
            cancel: cancel.clone(),
        };

        info!(
            indexer = %self.config.id,
            backend = self.backend.name(),
            start_height = self.config.start_height,
            contract = %self.config.filter.contract,
            event_types = ?self.config.filter.event_types,
            "Starting indexer"
        );

        let historical = runtime.spawn(worker.clone().historical_sync());
        let live = runtime.spawn(worker.live_poll());
        runtime.spawn(supervise(
            self.config.id.clone(),
            Arc::clone(&self.cursor),
            cancel,
            historical,
            live,
        ));

        Ok(receiver)
    }
}

impl<B: BackendAdapter> std::fmt::Debug for Indexer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("id", &self.config.id)
            .field("backend", &self.backend.name())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Wait for both phases, log how they ended, then mark the cursor stopped.
///
/// A phase that ends without finishing its work cancels the other one.
async fn supervise(
    id: String,
    cursor: Arc<SyncCursor>,
    stop: CancellationToken,
    historical: JoinHandle<Result<(), IndexerError>>,
    live: JoinHandle<Result<(), IndexerError>>,
) {
    for (phase, handle) in [("historical", historical), ("live", live)] {
        match handle.await {
            Ok(Ok(())) => {
                debug!(indexer = %id, phase, "Phase finished");
                continue;
            }
            Ok(Err(e)) if e.is_shutdown() => info!(indexer = %id, phase, reason = %e, "Phase stopped"),
            Ok(Err(e)) => error!(indexer = %id, phase, error = %e, "Phase failed"),
            Err(e) => error!(indexer = %id, phase, error = %e, "Phase task aborted"),
        }
        stop.cancel();
    }
    cursor.mark_stopped();
    info!(indexer = %id, height = cursor.current_height(), "Indexer stopped");
}

/// Everything one phase needs. Cloned once per phase.
struct SyncWorker<B: BackendAdapter> {
    config: Arc<IndexerConfig>,
    backend: Arc<B>,
    cursor: Arc<SyncCursor>,
    retry: RetryPolicy,
    cx: CallContext,
    queue: EventSender,
    cancel: CancellationToken,
}

impl<B: BackendAdapter> Clone for SyncWorker<B> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            backend: Arc::clone(&self.backend),
            cursor: Arc::clone(&self.cursor),
            retry: self.retry.clone(),
            cx: self.cx.clone(),
            queue: self.queue.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<B: BackendAdapter> SyncWorker<B> {
    async fn historical_sync(self) -> Result<(), IndexerError> {
        let id = &self.config.id;
        info!(indexer = %id, from = self.cursor.current_height(), "Starting historical sync");

        loop {
            if self.cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }

            let latest = match self.probe_latest().await {
                Ok(latest) => latest,
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    error!(indexer = %id, error = %e, "Latest height probe failed, pausing historical sync");
                    sleep_or_cancel(&self.cancel, self.config.recovery_interval()).await?;
                    continue;
                }
            };

            let current = self.cursor.current_height();
            if current >= latest {
                self.cursor.mark_up_to_date();
                info!(indexer = %id, height = current, latest, "Historical sync complete, handing off to live poll");
                return Ok(());
            }

            let end = current
                .saturating_add(self.config.batch_size - 1)
                .min(latest);
            match self.sync_range(current, end).await {
                Ok(count) => {
                    info!(indexer = %id, from = current, to = end, latest, events = count, "Historical batch complete");
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    warn!(indexer = %id, from = current, to = end, error = %e, "Range fetch failed, retrying after recovery interval");
                    sleep_or_cancel(&self.cancel, self.config.recovery_interval()).await?;
                }
            }
        }
    }

    async fn live_poll(self) -> Result<(), IndexerError> {
        let id = &self.config.id;
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(IndexerError::Cancelled),
                _ = ticker.tick() => {}
            }

            if !self.cursor.is_up_to_date() {
                trace!(indexer = %id, "Historical sync still running, skipping live tick");
                continue;
            }

            match self.poll_once().await {
                Ok(0) => trace!(indexer = %id, "Live tick delivered no events"),
                Ok(count) => debug!(indexer = %id, events = count, "Live tick complete"),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => warn!(indexer = %id, error = %e, "Live tick failed, retrying on next tick"),
            }
        }
    }

    /// One live tick: deliver `[cursor, latest]` in batch-sized chunks.
    async fn poll_once(&self) -> Result<usize, IndexerError> {
        let latest = self.probe_latest().await?;
        let mut total = 0;
        loop {
            let current = self.cursor.current_height();
            if latest < current {
                return Ok(total);
            }
            let end = current
                .saturating_add(self.config.batch_size - 1)
                .min(latest);
            total += self.sync_range(current, end).await?;
            debug!(indexer = %self.config.id, from = current, to = end, latest, "Live range delivered");
        }
    }

    async fn probe_latest(&self) -> Result<u64, IndexerError> {
        let (backend, cx) = (&self.backend, &self.cx);
        self.retry
            .run(&self.cancel, || backend.latest_height(cx))
            .await
    }

    /// Fetch `[from, to]`, push the matching events in order, then advance the
    /// cursor to `to + 1`.
    async fn sync_range(&self, from: u64, to: u64) -> Result<usize, IndexerError> {
        if self.cancel.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }
        let mut events = self
            .backend
            .fetch_events(&self.cx, from, to, &self.config.filter)
            .await?;

        let fetched = events.len();
        let filter = &self.config.filter;
        events.retain(|e| {
            (from..=to).contains(&e.block_height) && filter.matches(&e.event_type, &e.contract)
        });
        if events.len() != fetched {
            warn!(
                indexer = %self.config.id,
                from,
                to,
                dropped = fetched - events.len(),
                "Backend returned events outside the requested range or filter"
            );
        }
        events.sort_by_key(|e| e.sort_key());

        let count = self.queue.push_all(events).await?;
        self.cursor.advance_to(to + 1)?;
        Ok(count)
    }
}
