//! Relay Engine
//!
//! Orchestrates the write path: submit → registry → buffer → trigger →
//! flush. This is the only place failure policy is decided.
//!
//! ## Architecture
//!
//! ```text
//! Producer 1 ──┐
//! Producer 2 ──┤──► submit ──► KeyedBuffer.append ──► FlushTrigger
//! Producer 3 ──┘                                          │
//!                          ┌───────────────┬──────────────┘
//!                          ▼               ▼
//!                    size flush       one-shot timer
//!                   (calling task)    (spawned task)
//!                          │               │
//!                          └──► flush gate ◄── at most one flush
//!                                   │          per key in flight
//!                                   ▼
//!                        drain ──► BatchWriter ──► store client
//! ```
//!
//! A flush never runs under the buffer's lock: the lock is released the
//! moment `drain` returns, so producer appends proceed while the store
//! call is in flight. The per-key flush gate serializes flushes, which
//! preserves row order across batch boundaries. A batch that exhausts
//! its retries is logged, handed to the failure sink, and dropped,
//! never re-inserted ahead of newer rows.

use crate::config::RelayConfig;
use crate::relay::buffer::{AppendError, Batch};
use crate::relay::command::{is_valid_target, Command};
use crate::relay::registry::BufferRegistry;
use crate::relay::stats::{RelayStats, RelayStatsSnapshot};
use crate::relay::trigger::{FlushDecision, FlushTrigger};
use crate::relay::writer::BatchWriter;
use crate::store::{StoreClient, StoreError};
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Submit rejection, visible to the ingestion collaborator.
#[derive(Debug)]
pub enum RelayError {
    /// Empty or malformed target; no buffer was created for it.
    InvalidTarget,
    /// Per-key hard cap reached (backpressure). The caller must slow
    /// down or reject upstream; the relay will not grow the buffer.
    BufferFull {
        key: String,
        pending: usize,
        limit: usize,
    },
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::InvalidTarget => write!(f, "invalid target"),
            RelayError::BufferFull {
                key,
                pending,
                limit,
            } => write!(
                f,
                "buffer full for {}: {} pending (limit {})",
                key, pending, limit
            ),
        }
    }
}

impl std::error::Error for RelayError {}

/// A batch dropped after exhausting its retries, surfaced to the
/// operator-visible failure sink.
#[derive(Debug)]
pub struct DroppedBatch {
    pub batch: Batch,
    pub error: StoreError,
}

struct EngineInner<C: StoreClient> {
    registry: BufferRegistry,
    trigger: FlushTrigger,
    writer: BatchWriter<C>,
    /// Per-key flush gates; tokio mutexes because the store call awaits
    /// while the gate is held.
    flush_gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>, RandomState>>,
    failure_tx: Mutex<Option<mpsc::UnboundedSender<DroppedBatch>>>,
    stats: RelayStats,
}

/// The relay's top-level handle. Cheap to clone; all clones share the
/// same registry, gates, and counters.
pub struct RelayEngine<C: StoreClient> {
    inner: Arc<EngineInner<C>>,
}

impl<C: StoreClient> Clone for RelayEngine<C> {
    fn clone(&self) -> Self {
        RelayEngine {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: StoreClient> RelayEngine<C> {
    pub fn new(config: &RelayConfig, client: Arc<C>) -> Self {
        RelayEngine {
            inner: Arc::new(EngineInner {
                registry: BufferRegistry::new(config.max_buffered_per_key),
                trigger: FlushTrigger::new(config.flush_threshold, config.max_delay),
                writer: BatchWriter::new(client, config.retry.clone()),
                flush_gates: Mutex::new(HashMap::with_hasher(RandomState::new())),
                failure_tx: Mutex::new(None),
                stats: RelayStats::new(),
            }),
        }
    }

    /// Subscribe to dropped batches. Replaces any previous subscriber.
    pub fn failure_stream(&self) -> mpsc::UnboundedReceiver<DroppedBatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.failure_tx.lock() = Some(tx);
        rx
    }

    /// Accept one command: route it to its key's buffer and run the
    /// flush trigger on the new pending count. A size-triggered flush
    /// executes on the calling task before this returns; a timer flush
    /// runs later on its own task.
    pub async fn submit(&self, cmd: Command) -> Result<(), RelayError> {
        if !is_valid_target(&cmd.target) {
            self.inner.stats.record_rejected_invalid();
            return Err(RelayError::InvalidTarget);
        }

        let Command { target, mut row } = cmd;
        let count = loop {
            let buf = self.inner.registry.get_or_create(&target);
            match buf.append(row) {
                Ok(count) => break count,
                Err(AppendError::Full {
                    pending, limit, ..
                }) => {
                    self.inner.stats.record_overflow_rejection();
                    return Err(RelayError::BufferFull {
                        key: target,
                        pending,
                        limit,
                    });
                }
                // Lost a race with idle eviction; re-resolve the key.
                Err(AppendError::Retired { row: returned }) => {
                    row = returned;
                }
            }
        };
        self.inner.stats.record_submitted();

        match self.inner.trigger.after_append(count) {
            FlushDecision::Flush => {
                self.inner.stats.record_size_flush();
                self.flush_key(&target).await;
            }
            FlushDecision::ArmTimer => self.arm_timer(&target),
            FlushDecision::None => {}
        }
        Ok(())
    }

    /// Drain and write one key's pending rows. Serialized per key by the
    /// flush gate; an empty drain (the other trigger won, or nothing
    /// pending) is a no-op.
    pub async fn flush_key(&self, key: &str) {
        let gate = self.flush_gate(key);
        let _guard = gate.lock().await;

        let Some(buf) = self.inner.registry.get(key) else {
            return;
        };
        let batch = buf.drain();
        if batch.is_empty() {
            return;
        }
        debug!("flushing {} rows for {} (seq {})", batch.len(), key, batch.seq());

        match self.inner.writer.write(&batch).await {
            Ok(()) => self.inner.stats.record_flushed(batch.len() as u64),
            Err(e) => self.report_failure(batch, e),
        }
    }

    /// Drain and write every key once (shutdown path).
    pub async fn flush_all(&self) {
        for key in self.inner.registry.keys() {
            self.flush_key(&key).await;
        }
    }

    /// Retire and drop buffers idle past `ttl`; their flush gates go
    /// with them. Returns the number evicted.
    pub fn evict_idle(&self, ttl: std::time::Duration) -> usize {
        let evicted = self.inner.registry.evict_idle(ttl);
        if evicted > 0 {
            let mut gates = self.inner.flush_gates.lock();
            gates.retain(|key, _| self.inner.registry.get(key).is_some());
            debug!("evicted {} idle buffers", evicted);
        }
        evicted
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of keys currently registered.
    pub fn key_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Arm the one-shot delay timer for a fresh accumulation cycle. The
    /// timer captures the buffer's flush epoch; if a size flush moves
    /// the epoch before the timer fires, the timer is superseded and
    /// does not drain.
    fn arm_timer(&self, key: &str) {
        let Some(buf) = self.inner.registry.get(key) else {
            return;
        };
        let armed_epoch = buf.flush_epoch();
        let engine = self.clone();
        let key = key.to_string();
        let delay = self.inner.trigger.max_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.timer_fire(&key, armed_epoch).await;
        });
    }

    async fn timer_fire(&self, key: &str, armed_epoch: u64) {
        let Some(buf) = self.inner.registry.get(key) else {
            return;
        };
        if buf.flush_epoch() != armed_epoch {
            self.inner.stats.record_timer_superseded();
            return;
        }
        self.inner.stats.record_timer_flush();
        self.flush_key(key).await;
    }

    fn flush_gate(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.inner.flush_gates.lock();
        gates
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn report_failure(&self, batch: Batch, err: StoreError) {
        self.inner.stats.record_dropped(batch.len() as u64);
        error!(
            "dropping batch for {} (seq {}, {} rows) after exhausted retries: {}",
            batch.key(),
            batch.seq(),
            batch.len(),
            err
        );
        let tx = self.inner.failure_tx.lock();
        if let Some(tx) = tx.as_ref() {
            let _ = tx.send(DroppedBatch { batch, error: err });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::command::Row;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn config(threshold: usize, max_delay_ms: u64) -> RelayConfig {
        RelayConfig {
            flush_threshold: threshold,
            max_delay: Duration::from_millis(max_delay_ms),
            max_buffered_per_key: 1000,
            ..RelayConfig::test()
        }
    }

    fn cmd(target: &str, n: u32) -> Command {
        Command::new(target, Row::from_fields([n.to_string()]))
    }

    #[tokio::test]
    async fn test_invalid_target_creates_no_buffer() {
        let store = Arc::new(InMemoryStore::new());
        let engine = RelayEngine::new(&config(10, 10_000), store.clone());

        let result = engine.submit(cmd("", 1)).await;
        assert!(matches!(result, Err(RelayError::InvalidTarget)));
        let result = engine.submit(cmd("two words", 1)).await;
        assert!(matches!(result, Err(RelayError::InvalidTarget)));

        assert_eq!(engine.key_count(), 0);
        assert_eq!(engine.stats().rejected_invalid, 2);
    }

    #[tokio::test]
    async fn test_size_flush_on_submitting_task() {
        let store = Arc::new(InMemoryStore::new());
        let engine = RelayEngine::new(&config(3, 10_000), store.clone());

        engine.submit(cmd("events", 1)).await.unwrap();
        engine.submit(cmd("events", 2)).await.unwrap();
        assert!(store.is_empty());

        engine.submit(cmd("events", 3)).await.unwrap();
        let batches = store.batches_for("events");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(engine.stats().size_flushes, 1);
    }

    #[tokio::test]
    async fn test_flush_all_drains_every_key() {
        let store = Arc::new(InMemoryStore::new());
        let engine = RelayEngine::new(&config(100, 10_000), store.clone());

        engine.submit(cmd("a", 1)).await.unwrap();
        engine.submit(cmd("b", 2)).await.unwrap();
        engine.submit(cmd("b", 3)).await.unwrap();
        assert!(store.is_empty());

        engine.flush_all().await;
        assert_eq!(store.rows_for("a").len(), 1);
        assert_eq!(store.rows_for("b").len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_flush_key_single_batch() {
        let store = Arc::new(InMemoryStore::new());
        let engine = RelayEngine::new(&config(100, 10_000), store.clone());

        for i in 0..10 {
            engine.submit(cmd("events", i)).await.unwrap();
        }

        // Both triggers racing resolve to one non-empty drain.
        let e1 = engine.clone();
        let e2 = engine.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { e1.flush_key("events").await }),
            tokio::spawn(async move { e2.flush_key("events").await }),
        );
        r1.unwrap();
        r2.unwrap();

        let batches = store.batches_for("events");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
    }

    #[tokio::test]
    async fn test_eviction_race_reresolves() {
        let store = Arc::new(InMemoryStore::new());
        let engine = RelayEngine::new(&config(100, 10_000), store.clone());

        engine.submit(cmd("events", 1)).await.unwrap();
        engine.flush_all().await;
        assert_eq!(engine.evict_idle(Duration::ZERO), 1);
        assert_eq!(engine.key_count(), 0);

        // The key is usable again immediately.
        engine.submit(cmd("events", 2)).await.unwrap();
        assert_eq!(engine.key_count(), 1);
        engine.flush_all().await;
        assert_eq!(store.rows_for("events").len(), 2);
    }
}
