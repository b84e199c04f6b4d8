//! End-to-end behaviour of the index loop against a scripted backend.
//!
//! Every test runs with Tokio's clock paused, so poll intervals, backoffs and
//! recovery pauses elapse instantly once the runtime is idle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use eventindex_core::{
    BackendAdapter, CallContext, Event, EventFilter, EventReceiver, Indexer, IndexerConfig,
    IndexerError, IndexerState,
};

const CONTRACT: &str = "layer1contract";
const TASK_CREATED: &str = "wasm-NewTaskCreated";

// ─── Scripted backend ─────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedChain {
    tip: AtomicU64,
    events: Mutex<Vec<Event>>,
    fetches: Mutex<Vec<(u64, u64)>>,
    probes: AtomicU32,
    failing_probes: AtomicU32,
    failing_fetches: AtomicU32,
    fetch_delay: Duration,
}

impl ScriptedChain {
    fn with_tip(tip: u64) -> Self {
        let chain = Self::default();
        chain.tip.store(tip, Ordering::SeqCst);
        chain
    }

    /// One matching event on every height in `heights`.
    fn one_per_height(self, heights: std::ops::RangeInclusive<u64>) -> Self {
        self.events
            .lock()
            .unwrap()
            .extend(heights.map(|h| event(h, 0, 0, TASK_CREATED, CONTRACT)));
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    fn push_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn fetches(&self) -> Vec<(u64, u64)> {
        self.fetches.lock().unwrap().clone()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl BackendAdapter for ScriptedChain {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn latest_height(&self, cx: &CallContext) -> Result<u64, IndexerError> {
        cx.call(async {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if take_one(&self.failing_probes) {
                return Err(IndexerError::Rpc("status: connection refused".into()));
            }
            Ok(self.tip.load(Ordering::SeqCst))
        })
        .await
    }

    async fn fetch_events(
        &self,
        cx: &CallContext,
        from: u64,
        to: u64,
        _filter: &EventFilter,
    ) -> Result<Vec<Event>, IndexerError> {
        cx.call(async {
            self.fetches.lock().unwrap().push((from, to));
            if !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
            if take_one(&self.failing_fetches) {
                return Err(IndexerError::Rpc("block_results: 503".into()));
            }
            // Unfiltered on purpose: the index loop must apply the filter too.
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| (from..=to).contains(&e.block_height))
                .cloned()
                .collect())
        })
        .await
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn event(height: u64, tx_index: u32, event_index: u32, event_type: &str, contract: &str) -> Event {
    Event {
        block_height: height,
        tx_hash: format!("{height:08X}{tx_index:04X}"),
        tx_index,
        event_index,
        event_type: event_type.into(),
        contract: contract.into(),
        attributes: BTreeMap::new(),
    }
}

fn config() -> IndexerConfig {
    IndexerConfig {
        id: "it".into(),
        start_height: 1,
        filter: EventFilter::contract(CONTRACT).event_type(TASK_CREATED),
        batch_size: 100,
        poll_interval_ms: 1_000,
        recovery_interval_ms: 5_000,
        rate_limit: 1_000.0,
        ..Default::default()
    }
}

fn start(config: IndexerConfig, chain: &Arc<ScriptedChain>) -> (Indexer<ScriptedChain>, EventReceiver, CancellationToken) {
    let indexer = Indexer::with_shared_backend(config, Arc::clone(chain));
    let cancel = CancellationToken::new();
    let events = indexer.run(cancel.clone()).unwrap();
    (indexer, events, cancel)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}

async fn recv_heights(events: &mut EventReceiver, n: usize) -> Vec<u64> {
    let mut heights = Vec::with_capacity(n);
    for _ in 0..n {
        heights.push(events.recv().await.expect("stream ended early").block_height);
    }
    heights
}

fn assert_contiguous(fetches: &[(u64, u64)], start: u64) {
    let mut next = start;
    for &(from, to) in fetches {
        assert_eq!(from, next, "ranges must be contiguous: {fetches:?}");
        assert!(to >= from);
        next = to + 1;
    }
}

// ─── Historical sync ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn historical_sync_splits_into_batches() {
    let chain = Arc::new(ScriptedChain::with_tip(250).one_per_height(1..=250));
    let (indexer, mut events, cancel) = start(config(), &chain);

    let heights = recv_heights(&mut events, 250).await;
    assert_eq!(heights, (1..=250).collect::<Vec<_>>());

    wait_until(|| indexer.snapshot().is_up_to_date).await;
    assert_eq!(chain.fetches(), vec![(1, 100), (101, 200), (201, 250)]);

    let snap = indexer.snapshot();
    assert_eq!(snap.current_height, 251);
    assert_eq!(snap.state, IndexerState::Polling);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn respects_start_height() {
    let chain = Arc::new(ScriptedChain::with_tip(60).one_per_height(1..=60));
    let cfg = IndexerConfig { start_height: 40, ..config() };
    let (indexer, mut events, cancel) = start(cfg, &chain);

    assert_eq!(recv_heights(&mut events, 21).await, (40..=60).collect::<Vec<_>>());
    wait_until(|| indexer.snapshot().is_up_to_date).await;
    assert_eq!(chain.fetches(), vec![(40, 60)]);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn delivers_events_in_chain_order() {
    let chain = Arc::new(ScriptedChain::with_tip(3));
    // Stored out of order; delivery must follow (height, tx, event) order.
    chain.push_event(event(3, 0, 0, TASK_CREATED, CONTRACT));
    chain.push_event(event(2, 1, 4, TASK_CREATED, CONTRACT));
    chain.push_event(event(2, 1, 2, TASK_CREATED, CONTRACT));
    chain.push_event(event(2, 0, 9, TASK_CREATED, CONTRACT));
    chain.push_event(event(1, 5, 0, TASK_CREATED, CONTRACT));

    let (_indexer, mut events, cancel) = start(config(), &chain);
    let mut keys = Vec::new();
    for _ in 0..5 {
        keys.push(events.recv().await.unwrap().sort_key());
    }
    assert_eq!(keys, vec![(1, 5, 0), (2, 0, 9), (2, 1, 2), (2, 1, 4), (3, 0, 0)]);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn filters_by_contract_and_event_type() {
    let chain = Arc::new(ScriptedChain::with_tip(5));
    chain.push_event(event(3, 0, 0, TASK_CREATED, CONTRACT));
    chain.push_event(event(3, 0, 1, TASK_CREATED, "layer1othercontract"));
    chain.push_event(event(3, 1, 0, "wasm-Unrelated", CONTRACT));
    chain.push_event(event(3, 2, 0, "transfer", "layer1bank"));

    let (indexer, mut events, cancel) = start(config(), &chain);
    let only = events.recv().await.unwrap();
    assert_eq!(only.sort_key(), (3, 0, 0));
    assert_eq!(only.contract, CONTRACT);

    wait_until(|| indexer.snapshot().is_up_to_date).await;
    assert!(events.try_recv().is_none());
    cancel.cancel();
}

// ─── Failure recovery ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_ranges_are_refetched_without_loss() {
    let chain = Arc::new(ScriptedChain::with_tip(50).one_per_height(1..=50));
    chain.failing_fetches.store(3, Ordering::SeqCst);
    let cfg = IndexerConfig { batch_size: 20, ..config() };
    let started = Instant::now();
    let (indexer, mut events, cancel) = start(cfg, &chain);

    let heights = recv_heights(&mut events, 50).await;
    assert_eq!(heights, (1..=50).collect::<Vec<_>>());
    // Three recovery pauses of 5s each before the first range succeeds.
    assert!(started.elapsed() >= Duration::from_secs(15));

    wait_until(|| indexer.snapshot().is_up_to_date).await;
    assert_eq!(
        chain.fetches(),
        vec![(1, 20), (1, 20), (1, 20), (1, 20), (21, 40), (41, 50)]
    );
    assert!(events.try_recv().is_none(), "no duplicates after recovery");
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn exhausted_probe_recovers_after_pause() {
    let chain = Arc::new(ScriptedChain::with_tip(2).one_per_height(1..=2));
    // Two exhausted rounds of three attempts, then one more failure.
    chain.failing_probes.store(7, Ordering::SeqCst);
    let cfg = IndexerConfig {
        max_height_probe_attempts: 3,
        retry_backoff_ms: 1_000,
        max_retry_backoff_ms: 10_000,
        ..config()
    };
    assert_eq!(cfg.probe_recovery_bound(), Duration::from_secs(8));

    let started = Instant::now();
    let (_indexer, mut events, cancel) = start(cfg, &chain);
    assert_eq!(recv_heights(&mut events, 2).await, vec![1, 2]);

    // (1s + 2s + 5s) twice, then a single 1s backoff.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(17), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(18), "{elapsed:?}");
    assert!(chain.probes.load(Ordering::SeqCst) >= 8);
    cancel.cancel();
}

// ─── Handoff and live poll ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn live_poll_waits_for_handoff_then_tails() {
    let chain = Arc::new(
        ScriptedChain::with_tip(100)
            .one_per_height(1..=110)
            .slow(Duration::from_secs(30)),
    );
    let cfg = IndexerConfig { batch_size: 10, ..config() };
    let (indexer, mut events, cancel) = start(cfg, &chain);

    // Live ticks every second for the whole ~300s of slow historical fetches.
    assert_eq!(recv_heights(&mut events, 100).await, (1..=100).collect::<Vec<_>>());
    wait_until(|| indexer.snapshot().is_up_to_date).await;
    assert_eq!(chain.fetches().len(), 10);
    assert_contiguous(&chain.fetches(), 1);

    chain.set_tip(110);
    assert_eq!(recv_heights(&mut events, 10).await, (101..=110).collect::<Vec<_>>());
    wait_until(|| indexer.snapshot().current_height == 111).await;

    let fetches = chain.fetches();
    assert_contiguous(&fetches, 1);
    assert_eq!(fetches.last(), Some(&(101, 110)));
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn live_poll_splits_large_gaps() {
    let chain = Arc::new(ScriptedChain::with_tip(5).one_per_height(1..=30));
    let cfg = IndexerConfig { batch_size: 10, ..config() };
    let (indexer, mut events, cancel) = start(cfg, &chain);

    assert_eq!(recv_heights(&mut events, 5).await, vec![1, 2, 3, 4, 5]);
    wait_until(|| indexer.snapshot().is_up_to_date).await;

    chain.set_tip(30);
    assert_eq!(recv_heights(&mut events, 25).await, (6..=30).collect::<Vec<_>>());
    wait_until(|| indexer.snapshot().current_height == 31).await;
    assert_eq!(chain.fetches(), vec![(1, 5), (6, 15), (16, 25), (26, 30)]);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn idle_chain_issues_no_fetches() {
    let chain = Arc::new(ScriptedChain::with_tip(3).one_per_height(1..=3));
    let (indexer, mut events, cancel) = start(config(), &chain);
    recv_heights(&mut events, 3).await;
    wait_until(|| indexer.snapshot().is_up_to_date).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(chain.fetches(), vec![(1, 3)]);
    assert!(chain.probes.load(Ordering::SeqCst) > 10, "live poll keeps probing");
    cancel.cancel();
}

// ─── Backpressure and shutdown ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn slow_consumer_holds_the_cursor() {
    let chain = Arc::new(ScriptedChain::with_tip(100).one_per_height(1..=100));
    let cfg = IndexerConfig { batch_size: 10, queue_capacity: 4, ..config() };
    let (indexer, mut events, cancel) = start(cfg, &chain);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(events.len(), 4);
    assert_eq!(chain.fetches(), vec![(1, 10)]);
    assert_eq!(indexer.snapshot().current_height, 1, "cursor waits for the whole range");

    assert_eq!(recv_heights(&mut events, 100).await, (1..=100).collect::<Vec<_>>());
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn cancel_unblocks_full_queue_and_stops_fetching() {
    let chain = Arc::new(ScriptedChain::with_tip(100).one_per_height(1..=100));
    let cfg = IndexerConfig { batch_size: 10, queue_capacity: 4, ..config() };
    let (indexer, mut events, cancel) = start(cfg, &chain);

    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();

    // Already-queued events drain, then the stream ends.
    assert_eq!(recv_heights(&mut events, 4).await, vec![1, 2, 3, 4]);
    assert!(events.recv().await.is_none());

    let fetched = chain.fetches().len();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(chain.fetches().len(), fetched);
    assert_eq!(indexer.state(), IndexerState::Stopped);
    assert_eq!(indexer.snapshot().current_height, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_slow_fetch_ends_stream() {
    let chain = Arc::new(
        ScriptedChain::with_tip(100)
            .one_per_height(1..=100)
            .slow(Duration::from_secs(3_600)),
    );
    let (indexer, mut events, cancel) = start(config(), &chain);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(chain.fetches(), vec![(1, 100)]);
    cancel.cancel();

    assert!(events.recv().await.is_none());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(indexer.state(), IndexerState::Stopped);
    assert_eq!(indexer.snapshot().current_height, 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_consumer_stops_the_indexer() {
    let chain = Arc::new(ScriptedChain::with_tip(10).one_per_height(1..=10));
    let (indexer, events, _cancel) = start(config(), &chain);
    drop(events);

    wait_until(|| indexer.state() == IndexerState::Stopped).await;
    assert_eq!(indexer.snapshot().current_height, 1);
}
