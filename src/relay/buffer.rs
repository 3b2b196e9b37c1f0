//! Per-Key Write Buffer
//!
//! A `KeyedBuffer` accumulates pending rows for one downstream target.
//! Producers append concurrently under a single mutex; a flush captures
//! the whole pending sequence atomically by swapping the vector out, so
//! no row appended after the drain begins is included and no row present
//! before it is lost or duplicated.
//!
//! The buffer publishes a flush epoch through an atomic counter. A
//! delayed-flush timer records the epoch when it is armed; if the epoch
//! has moved by the time the timer fires, a size-triggered flush already
//! won the cycle and the timer must not drain again.

use crate::relay::command::Row;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// An immutable group of rows captured from one buffer at flush time.
///
/// `seq` increases monotonically per key and identifies the batch in
/// logs and the failure sink; it is not enforced downstream.
#[derive(Debug, Clone)]
pub struct Batch {
    key: String,
    seq: u64,
    rows: Vec<Row>,
}

impl Batch {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consume the batch, yielding its rows (failure-sink consumers).
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Append rejection. The row is handed back so the caller can retry
/// against a fresh buffer after an eviction race.
#[derive(Debug)]
pub enum AppendError {
    /// Hard cap reached (backpressure); the caller must not grow the buffer.
    Full {
        row: Row,
        pending: usize,
        limit: usize,
    },
    /// The buffer was retired by idle eviction after the caller resolved
    /// it; the key must be re-resolved through the registry.
    Retired { row: Row },
}

impl std::fmt::Display for AppendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppendError::Full { pending, limit, .. } => {
                write!(f, "buffer full: {} pending (limit {})", pending, limit)
            }
            AppendError::Retired { .. } => write!(f, "buffer retired"),
        }
    }
}

impl std::error::Error for AppendError {}

struct BufferInner {
    rows: Vec<Row>,
    last_flush: Instant,
    retired: bool,
}

/// Pending rows for one key, behind a single mutex.
///
/// Critical sections are O(1) for append and a pointer swap for drain;
/// no store call ever runs under this lock.
pub struct KeyedBuffer {
    key: String,
    max_pending: usize,
    inner: Mutex<BufferInner>,
    /// Completed (non-empty) flush count; doubles as the batch sequence.
    flushes: AtomicU64,
}

impl KeyedBuffer {
    pub fn new(key: String, max_pending: usize) -> Self {
        debug_assert!(max_pending > 0, "Precondition: max_pending must be positive");
        KeyedBuffer {
            key,
            max_pending,
            inner: Mutex::new(BufferInner {
                rows: Vec::new(),
                last_flush: Instant::now(),
                retired: false,
            }),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append a row to the tail of the pending sequence, returning the
    /// new pending count. Safe under concurrent calls; the flush trigger
    /// is evaluated by the caller on the returned count, outside this
    /// lock.
    pub fn append(&self, row: Row) -> Result<usize, AppendError> {
        let mut inner = self.inner.lock();
        if inner.retired {
            return Err(AppendError::Retired { row });
        }
        if inner.rows.len() >= self.max_pending {
            return Err(AppendError::Full {
                row,
                pending: inner.rows.len(),
                limit: self.max_pending,
            });
        }
        inner.rows.push(row);
        Ok(inner.rows.len())
    }

    /// Atomically capture the pending sequence as a `Batch` and reset the
    /// buffer to empty. An empty buffer yields an empty batch and leaves
    /// the flush epoch untouched (a no-op flush is not a flush).
    pub fn drain(&self) -> Batch {
        let mut inner = self.inner.lock();
        if inner.rows.is_empty() {
            return Batch {
                key: self.key.clone(),
                seq: self.flushes.load(Ordering::Acquire),
                rows: Vec::new(),
            };
        }
        let rows = std::mem::take(&mut inner.rows);
        inner.last_flush = Instant::now();
        let seq = self
            .flushes
            .fetch_add(1, Ordering::AcqRel)
            .checked_add(1)
            .expect("flush sequence overflow is unreachable");
        Batch {
            key: self.key.clone(),
            seq,
            rows,
        }
    }

    /// Current flush epoch. A timer armed at epoch `e` is superseded once
    /// this reads anything other than `e`.
    pub fn flush_epoch(&self) -> u64 {
        self.flushes.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().rows.len()
    }

    /// Retire this buffer if it is empty and has been idle past `ttl`.
    /// Retirement happens under the buffer lock, so an append racing with
    /// eviction observes it and re-resolves the key.
    pub fn retire_if_idle(&self, ttl: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.rows.is_empty() && inner.last_flush.elapsed() >= ttl {
            inner.retired = true;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn is_retired(&self) -> bool {
        self.inner.lock().retired
    }
}
