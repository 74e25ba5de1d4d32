//! End-to-end run scenarios.
//!
//! Drives the orchestrator and scheduler against in-memory fakes (and the
//! real JSON snapshot store on a temp path) across consecutive runs.


use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use capwatch::engine::orchestrator::{Orchestrator, PartialPricePolicy, RunSettings};
use capwatch::engine::scheduler::Scheduler;
use capwatch::export::{Exporter, PRICED_FILE, UNPRICED_FILE};
use capwatch::storage::{JsonSnapshotStore, SnapshotStore};
use capwatch::types::{Bracket, CapMap, CapwatchError};

use fakes::{FakePriceFeed, FakeWallet, MemoryStore, RecordingNotifier};

const OWNER: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

fn temp_path(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{prefix}_{}", uuid::Uuid::new_v4()))
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= b.abs() * 1e-9 + 1e-9
}

fn settings() -> RunSettings {
    RunSettings {
        request_timeout: Duration::from_secs(2),
        holdings_timeout: Duration::from_secs(2),
        ..RunSettings::default()
    }
}

struct Harness {
    wallet: FakeWallet,
    feed: FakePriceFeed,
    notifier: RecordingNotifier,
}

impl Harness {
    fn new(tokens: &[&str]) -> Self {
        Self {
            wallet: FakeWallet::holding(tokens),
            feed: FakePriceFeed::new(99),
            notifier: RecordingNotifier::default(),
        }
    }

    fn orchestrator(&self, store: Arc<dyn SnapshotStore>, settings: RunSettings) -> Orchestrator {
        Orchestrator::new(
            OWNER,
            Arc::new(self.wallet.clone()),
            Arc::new(self.feed.clone()),
            Arc::new(self.notifier.clone()),
            store,
            settings,
        )
    }
}

// ---------------------------------------------------------------------------
// Two-run lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_run_then_bracket_change_with_json_store() {
    let path = temp_path("capwatch_it_state").with_extension("json");
    let store = Arc::new(JsonSnapshotStore::new(&path));

    let h = Harness::new(&["A", "B"]);
    h.feed.set_cap("A", 50_000.0);
    h.feed.set_cap("B", 2_000_000.0);
    let orch = h.orchestrator(store.clone(), settings());

    // Run 1: no snapshot yet, both tokens are newly bonded.
    let report = orch.run_once().await.unwrap();
    let events = h.notifier.events();
    assert_eq!(report.events.len(), 2);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.bracket == Bracket::UnbondedBonded && e.is_new_token()));

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(approx(snapshot["A"], 50_000.0));
    assert!(approx(snapshot["B"], 2_000_000.0));

    // Run 2: A climbs into the next bracket, B unchanged.
    h.notifier.clear();
    h.feed.set_cap("A", 150_000.0);
    let report = orch.run_once().await.unwrap();

    let events = h.notifier.events();
    assert_eq!(report.events.len(), 1);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].token, "A");
    assert_eq!(events[0].bracket, Bracket::ZeroTo100k);
    assert_eq!(events[0].previous, Some(Bracket::UnbondedBonded));
    assert!(approx(events[0].market_cap, 150_000.0));

    // Run 3: nothing moved, no events, snapshot still refreshed.
    h.notifier.clear();
    let report = orch.run_once().await.unwrap();
    assert!(report.events.is_empty());
    assert!(report.snapshot_saved);
    assert!(h.notifier.events().is_empty());

    store.delete().unwrap();
}

#[tokio::test]
async fn dropped_and_unpriced_tokens_leave_snapshot() {
    let store = MemoryStore::default();
    let h = Harness::new(&["A", "B", "C"]);
    h.feed.set_cap("A", 300_000.0);
    h.feed.set_cap("B", 4_000_000.0);
    h.feed.set_cap("C", 70_000.0);
    let orch = h.orchestrator(Arc::new(store.clone()), settings());

    orch.run_once().await.unwrap();
    assert_eq!(store.snapshot().unwrap().len(), 3);

    // B sold, C lost its quote.
    h.notifier.clear();
    h.wallet.set_tokens(&["A", "C"]);
    h.feed.remove("C");
    let report = orch.run_once().await.unwrap();

    assert!(report.events.is_empty());
    assert_eq!(report.unpriced, 1);
    let snapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["A"]);

    // C gets a quote again: it is reported as newly bonded.
    h.feed.set_cap("C", 5_000_000.0);
    let report = orch.run_once().await.unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].token, "C");
    assert_eq!(report.events[0].bracket, Bracket::UnbondedBonded);
}

// ---------------------------------------------------------------------------
// Failure policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn degrade_policy_persists_partial_snapshot() {
    let store = MemoryStore::default();
    let tokens: Vec<String> = (0..150).map(|i| format!("T{i:03}")).collect();
    let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();

    let h = Harness::new(&refs);
    for t in &tokens {
        h.feed.set_cap(t, 250_000.0);
    }
    // T120 sits in the second batch (ids 99..150).
    h.feed.fail_batches_containing("T120");

    let orch = h.orchestrator(Arc::new(store.clone()), settings());
    let report = orch.run_once().await.unwrap();

    assert_eq!(h.feed.batch_sizes().iter().sum::<usize>(), 150);
    assert!(h.feed.batch_sizes().iter().all(|n| *n <= 99));
    assert_eq!(report.price_batches, 2);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.priced, 99);
    assert_eq!(report.unpriced, 51);
    assert_eq!(store.snapshot().unwrap().len(), 99);
}

#[tokio::test]
async fn abort_policy_keeps_previous_baseline() {
    let store = MemoryStore::default();
    let h = Harness::new(&["A", "B"]);
    h.feed.set_cap("A", 50_000.0);
    h.feed.set_cap("B", 2_000_000.0);

    let abort = RunSettings {
        on_batch_failure: PartialPricePolicy::Abort,
        ..settings()
    };
    let orch = h.orchestrator(Arc::new(store.clone()), abort);
    orch.run_once().await.unwrap();
    let baseline = store.snapshot().unwrap();

    h.notifier.clear();
    h.feed.set_cap("A", 5_000_000.0);
    h.feed.fail_batches_containing("B");
    let err = orch.run_once().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CapwatchError>(),
        Some(CapwatchError::IncompletePricing { .. })
    ));
    assert!(h.notifier.events().is_empty());
    assert_eq!(store.save_count(), 1);
    assert_eq!(store.snapshot().unwrap(), baseline);

    // Next tick succeeds and reports the move against the old baseline.
    h.feed.clear_failures();
    let report = orch.run_once().await.unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].bracket, Bracket::OneMTo3M);
}

#[tokio::test]
async fn slow_price_batch_times_out_and_degrades() {
    let store = MemoryStore::default();
    let h = Harness::new(&["A"]);
    h.feed.set_cap("A", 600_000.0);
    h.feed.set_delay(Duration::from_millis(500));

    let quick = RunSettings {
        request_timeout: Duration::from_millis(50),
        ..settings()
    };
    let orch = h.orchestrator(Arc::new(store.clone()), quick);
    let report = orch.run_once().await.unwrap();

    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.unpriced, 1);
    assert!(report.events.is_empty());
    assert_eq!(store.snapshot().unwrap(), CapMap::new());
}

#[tokio::test]
async fn notifier_outage_still_saves() {
    let store = MemoryStore::default();
    let h = Harness::new(&["A"]);
    h.feed.set_cap("A", 1_500_000.0);
    h.notifier.set_failing(true);

    let orch = h.orchestrator(Arc::new(store.clone()), settings());
    let report = orch.run_once().await.unwrap();

    assert_eq!(report.notify_failures, 1);
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn holdings_outage_aborts_run() {
    let store = MemoryStore::default();
    let h = Harness::new(&["A"]);
    h.wallet.set_error("rpc node down");

    let orch = h.orchestrator(Arc::new(store.clone()), settings());
    assert!(orch.run_once().await.is_err());
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn corrupt_snapshot_is_fatal_for_run() {
    let path = temp_path("capwatch_it_corrupt").with_extension("json");
    std::fs::write(&path, "not json").unwrap();
    let store = Arc::new(JsonSnapshotStore::new(&path));

    let h = Harness::new(&["A"]);
    h.feed.set_cap("A", 10.0);
    let orch = h.orchestrator(store.clone(), settings());

    let err = orch.run_once().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CapwatchError>(),
        Some(CapwatchError::CorruptSnapshot { .. })
    ));
    assert!(h.notifier.events().is_empty());
    // The corrupt file is left for inspection, not overwritten.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");

    store.delete().unwrap();
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exports_written_each_run() {
    let dir = temp_path("capwatch_it_export");
    let h = Harness::new(&["Low", "High", "Unknown"]);
    h.feed.set_cap("Low", 80_000.0);
    h.feed.set_cap("High", 12_000_000.0);

    let orch = h
        .orchestrator(Arc::new(MemoryStore::default()), settings())
        .with_exporter(Exporter::new(&dir));
    orch.run_once().await.unwrap();

    let priced = std::fs::read_to_string(dir.join(PRICED_FILE)).unwrap();
    let rows: Vec<&str> = priced.lines().map(|l| l.split(',').next().unwrap()).collect();
    assert_eq!(rows, vec!["token", "High", "Low"]);

    let unpriced = std::fs::read_to_string(dir.join(UNPRICED_FILE)).unwrap();
    assert_eq!(unpriced, "token\nUnknown\n");

    std::fs::remove_dir_all(&dir).unwrap();
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scheduler_drops_overlapping_trigger() {
    let store = MemoryStore::default();
    let h = Harness::new(&["A"]);
    h.feed.set_cap("A", 200_000.0);
    h.feed.set_delay(Duration::from_millis(300));

    let orch = Arc::new(h.orchestrator(Arc::new(store.clone()), settings()));
    let scheduler = Scheduler::new(orch, Duration::from_secs(3600));

    let first = scheduler.trigger().expect("slot free");
    assert!(scheduler.slot().is_busy());
    assert!(scheduler.trigger().is_none());

    let report = first.await.unwrap().expect("run succeeds");
    assert_eq!(report.events.len(), 1);
    assert!(!scheduler.slot().is_busy());
    assert_eq!(store.save_count(), 1);

    // Slot is free again.
    let second = scheduler.trigger().expect("slot free after run");
    second.await.unwrap();
    assert_eq!(store.save_count(), 2);
}

#[tokio::test]
async fn scheduler_runs_eagerly_and_survives_failures() {
    let store = MemoryStore::default();
    let h = Harness::new(&["A"]);
    h.wallet.set_error("rpc node down");

    let orch = Arc::new(h.orchestrator(Arc::new(store.clone()), settings()));
    let scheduler = Scheduler::new(orch, Duration::from_millis(40));

    // Failing runs for a few ticks, then the wallet recovers.
    let wallet = h.wallet.clone();
    let feed = h.feed.clone();
    let shutdown = async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        feed.set_cap("A", 200_000.0);
        wallet.clear_error();
        tokio::time::sleep(Duration::from_millis(150)).await;
    };
    scheduler.run_until(shutdown).await;

    assert!(store.save_count() >= 1, "a run after recovery should have saved");
    assert!(store.snapshot().unwrap().contains_key("A"));
}
