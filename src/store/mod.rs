//! Downstream Store Abstraction
//!
//! The relay core treats the persistent store as an injected capability:
//! one async `write_batch` call per flushed batch, reporting success or a
//! typed failure. Implementations must tolerate concurrent calls for
//! different targets; per-call connection handling is their concern, not
//! the core's.
//!
//! ## Implementations
//!
//! - `InMemoryStore`: batch-granular recording, for unit tests and
//!   integration tests
//! - `FsStore`: appends rendered rows to one file per target, the
//!   development/demo backend
//! - `SimulatedStore`: deterministic fault injection wrapping
//!   `InMemoryStore`, for failure-path tests

pub mod fs;
pub mod memory;
pub mod simulated;

pub use fs::FsStore;
pub use memory::InMemoryStore;
pub use simulated::{FaultKind, SimulatedStore, SimulatedStoreStats};

use crate::relay::command::Row;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind};
use std::pin::Pin;

/// Error type for downstream batch writes.
#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached (refused, reset, DNS, ...)
    Connectivity(String),
    /// The store rejected the batch contents (constraint violation)
    Constraint(String),
    /// The write did not complete in time
    Timeout(String),
    /// Other I/O failure
    Io(IoError),
    /// The store is shut down or otherwise not accepting writes
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Connectivity(msg) => write!(f, "store unreachable: {}", msg),
            StoreError::Constraint(msg) => write!(f, "store rejected batch: {}", msg),
            StoreError::Timeout(msg) => write!(f, "store write timed out: {}", msg),
            StoreError::Io(e) => write!(f, "store I/O error: {}", e),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<IoError> for StoreError {
    fn from(e: IoError) -> Self {
        match e.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => StoreError::Connectivity(e.to_string()),
            ErrorKind::TimedOut => StoreError::Timeout(e.to_string()),
            _ => StoreError::Io(e),
        }
    }
}

/// Store client abstraction: one call writes one batch.
///
/// Follows the object-store trait pattern (`Pin<Box<dyn Future>>` methods)
/// so engines can be generic over the backend while handlers share it
/// through an `Arc`.
pub trait StoreClient: Send + Sync + 'static {
    /// Execute a single downstream write request carrying all rows of one
    /// batch, preserving their order. Must not retry internally; retry
    /// policy belongs to the caller.
    fn write_batch<'a>(
        &'a self,
        target: &'a str,
        rows: &'a [Row],
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;
}
