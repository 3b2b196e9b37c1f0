//! Failure-path behavior driven through `SimulatedStore`: bounded
//! retries, drop-and-report, and overflow backpressure.

use batch_relay::config::{RelayConfig, RetryConfig};
use batch_relay::relay::{Command, RelayEngine, RelayError, Row};
use batch_relay::store::{FaultKind, SimulatedStore, StoreError};
use std::sync::Arc;
use std::time::Duration;

fn config(threshold: usize, cap: usize, max_attempts: u32) -> RelayConfig {
    RelayConfig {
        flush_threshold: threshold,
        max_delay: Duration::from_secs(600),
        max_buffered_per_key: cap,
        retry: RetryConfig {
            max_attempts,
            backoff: Duration::from_millis(1),
        },
        ..RelayConfig::test()
    }
}

fn cmd(target: &str, n: usize) -> Command {
    Command::new(target, Row::from_fields([n.to_string()]))
}

#[tokio::test]
async fn test_retry_exactly_max_attempts_then_drop() {
    let store = Arc::new(SimulatedStore::new());
    store.fail_all_writes(FaultKind::Connectivity);
    let engine = RelayEngine::new(&config(2, 1000, 3), store.clone());
    let mut failures = engine.failure_stream();

    engine.submit(cmd("events", 0)).await.unwrap();
    engine.submit(cmd("events", 1)).await.unwrap();

    // The flush ran on the submitting task, so by now the batch has
    // been attempted exactly max_attempts times and dropped.
    assert_eq!(store.stats().write_attempts, 3);
    assert_eq!(store.inner().total_rows(), 0);

    let dropped = failures.try_recv().expect("dropped batch surfaced");
    assert_eq!(dropped.batch.key(), "events");
    assert_eq!(dropped.batch.seq(), 1);
    assert_eq!(dropped.batch.len(), 2);
    assert!(matches!(dropped.error, StoreError::Connectivity(_)));

    let stats = engine.stats();
    assert_eq!(stats.dropped_batches, 1);
    assert_eq!(stats.dropped_rows, 2);
    assert_eq!(stats.flushed_batches, 0);
}

#[tokio::test]
async fn test_buffer_accepts_new_writes_after_drop() {
    let store = Arc::new(SimulatedStore::new());
    store.fail_all_writes(FaultKind::Timeout);
    let engine = RelayEngine::new(&config(2, 1000, 2), store.clone());

    engine.submit(cmd("events", 0)).await.unwrap();
    engine.submit(cmd("events", 1)).await.unwrap();
    assert_eq!(engine.stats().dropped_batches, 1);

    // The store recovers; the key keeps working and the next batch has
    // the next sequence number.
    store.clear_faults();
    let mut failures = engine.failure_stream();
    engine.submit(cmd("events", 2)).await.unwrap();
    engine.submit(cmd("events", 3)).await.unwrap();

    let batches = store.inner().batches_for("events");
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert!(failures.try_recv().is_err(), "no new failures after recovery");

    let stats = engine.stats();
    assert_eq!(stats.flushed_batches, 1);
    assert_eq!(stats.dropped_batches, 1);
}

#[tokio::test]
async fn test_each_dropped_batch_retried_independently() {
    let store = Arc::new(SimulatedStore::new());
    store.fail_all_writes(FaultKind::Connectivity);
    let engine = RelayEngine::new(&config(2, 1000, 3), store.clone());

    for i in 0..4 {
        engine.submit(cmd("events", i)).await.unwrap();
    }

    // Two batches of two, each attempted exactly three times.
    assert_eq!(store.stats().write_attempts, 6);
    assert_eq!(engine.stats().dropped_batches, 2);
}

#[tokio::test]
async fn test_overflow_backpressure_without_flush() {
    let store = Arc::new(SimulatedStore::new());
    // Threshold above the cap: no flush is ever triggered, so the hard
    // cap is what stops memory growth.
    let engine = RelayEngine::new(&config(1000, 5, 3), store.clone());

    for i in 0..5 {
        engine.submit(cmd("events", i)).await.unwrap();
    }

    match engine.submit(cmd("events", 5)).await {
        Err(RelayError::BufferFull {
            key,
            pending,
            limit,
        }) => {
            assert_eq!(key, "events");
            assert_eq!(pending, 5);
            assert_eq!(limit, 5);
        }
        other => panic!("expected BufferFull, got {:?}", other),
    }
    assert_eq!(engine.stats().overflow_rejections, 1);

    // Other keys are unaffected by one key's backpressure.
    engine.submit(cmd("other", 1)).await.unwrap();

    // Draining the key makes room again.
    engine.flush_all().await;
    assert_eq!(store.inner().rows_for("events").len(), 5);
    engine.submit(cmd("events", 6)).await.unwrap();
    assert_eq!(engine.stats().overflow_rejections, 1);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_retry_budget() {
    let store = Arc::new(SimulatedStore::new());
    store.fail_next_writes(2, FaultKind::Connectivity);
    let engine = RelayEngine::new(&config(3, 1000, 3), store.clone());
    let mut failures = engine.failure_stream();

    for i in 0..3 {
        engine.submit(cmd("events", i)).await.unwrap();
    }

    // Two failed attempts, then success on the third: nothing dropped.
    assert_eq!(store.stats().write_attempts, 3);
    assert_eq!(store.inner().rows_for("events").len(), 3);
    assert!(failures.try_recv().is_err());
    assert_eq!(engine.stats().dropped_batches, 0);
    assert_eq!(engine.stats().flushed_batches, 1);
}
