//! Simulated store client with deterministic fault injection.
//!
//! Wraps `InMemoryStore` and fails writes according to an explicit plan
//! (fail the next N calls, fail every call, add per-target latency).
//! Failure-path tests drive retry, drop, and backpressure behavior with
//! it; the attempt counters make "retried exactly N times" assertable.

use super::{InMemoryStore, StoreClient, StoreError};
use crate::relay::command::Row;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Which error a planned fault produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Connectivity,
    Constraint,
    Timeout,
}

impl FaultKind {
    fn to_error(self) -> StoreError {
        match self {
            FaultKind::Connectivity => {
                StoreError::Connectivity("simulated connection failure".to_string())
            }
            FaultKind::Constraint => {
                StoreError::Constraint("simulated constraint violation".to_string())
            }
            FaultKind::Timeout => StoreError::Timeout("simulated timeout".to_string()),
        }
    }
}

/// Call counters for assertions.
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub write_attempts: u64,
    pub write_failures: u64,
}

struct SimState {
    /// Fail this many upcoming calls, then recover.
    fail_remaining: u64,
    fail_kind: FaultKind,
    /// Fail every call until cleared.
    fail_always: Option<FaultKind>,
    /// Extra latency applied to writes for specific targets.
    latency: HashMap<String, Duration>,
    stats: SimulatedStoreStats,
}

/// In-memory store with an explicit failure plan.
pub struct SimulatedStore {
    inner: InMemoryStore,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedStore {
    pub fn new() -> Self {
        SimulatedStore {
            inner: InMemoryStore::new(),
            state: Arc::new(Mutex::new(SimState {
                fail_remaining: 0,
                fail_kind: FaultKind::Connectivity,
                fail_always: None,
                latency: HashMap::new(),
                stats: SimulatedStoreStats::default(),
            })),
        }
    }

    /// Fail the next `n` write calls with the given fault, then recover.
    pub fn fail_next_writes(&self, n: u64, kind: FaultKind) {
        let mut s = self.state.lock();
        s.fail_remaining = n;
        s.fail_kind = kind;
    }

    /// Fail every write call until `clear_faults` is called.
    pub fn fail_all_writes(&self, kind: FaultKind) {
        self.state.lock().fail_always = Some(kind);
    }

    pub fn clear_faults(&self) {
        let mut s = self.state.lock();
        s.fail_remaining = 0;
        s.fail_always = None;
    }

    /// Add artificial latency to writes for one target (per-key isolation
    /// tests: a slow target must not delay others).
    pub fn set_target_latency(&self, target: &str, latency: Duration) {
        self.state.lock().latency.insert(target.to_string(), latency);
    }

    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    /// The wrapped store, for asserting successful writes.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

impl Default for SimulatedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SimulatedStore {
    fn clone(&self) -> Self {
        SimulatedStore {
            inner: self.inner.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl StoreClient for SimulatedStore {
    fn write_batch<'a>(
        &'a self,
        target: &'a str,
        rows: &'a [Row],
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let delay = {
                let mut s = self.state.lock();
                s.stats.write_attempts = s.stats.write_attempts.saturating_add(1);
                s.latency.get(target).copied()
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            {
                let mut s = self.state.lock();
                if let Some(kind) = s.fail_always {
                    s.stats.write_failures = s.stats.write_failures.saturating_add(1);
                    return Err(kind.to_error());
                }
                if s.fail_remaining > 0 {
                    s.fail_remaining -= 1;
                    let kind = s.fail_kind;
                    s.stats.write_failures = s.stats.write_failures.saturating_add(1);
                    return Err(kind.to_error());
                }
            }

            self.inner.write_batch(target, rows).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::command::Row;

    fn row(n: u32) -> Row {
        Row::from_fields([n.to_string()])
    }

    #[tokio::test]
    async fn test_no_faults_passes_through() {
        let store = SimulatedStore::new();
        store.write_batch("events", &[row(1)]).await.unwrap();

        assert_eq!(store.inner().total_rows(), 1);
        let stats = store.stats();
        assert_eq!(stats.write_attempts, 1);
        assert_eq!(stats.write_failures, 0);
    }

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let store = SimulatedStore::new();
        store.fail_next_writes(2, FaultKind::Connectivity);

        assert!(store.write_batch("events", &[row(1)]).await.is_err());
        assert!(store.write_batch("events", &[row(1)]).await.is_err());
        assert!(store.write_batch("events", &[row(1)]).await.is_ok());

        let stats = store.stats();
        assert_eq!(stats.write_attempts, 3);
        assert_eq!(stats.write_failures, 2);
    }

    #[tokio::test]
    async fn test_fail_always_until_cleared() {
        let store = SimulatedStore::new();
        store.fail_all_writes(FaultKind::Timeout);

        for _ in 0..3 {
            let result = store.write_batch("events", &[row(1)]).await;
            assert!(matches!(result, Err(StoreError::Timeout(_))));
        }

        store.clear_faults();
        assert!(store.write_batch("events", &[row(1)]).await.is_ok());
    }

    #[tokio::test]
    async fn test_latency_applies_per_target() {
        let store = SimulatedStore::new();
        store.set_target_latency("slow", Duration::from_millis(50));

        let start = std::time::Instant::now();
        store.write_batch("fast", &[row(1)]).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(40));

        let start = std::time::Instant::now();
        store.write_batch("slow", &[row(1)]).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
