//! batch-relay: a write-buffering relay.
//!
//! Sits between a stream of incoming write commands and a downstream
//! persistent store, accumulating writes per target key and flushing
//! them as batches: many small writes become few large ones, with
//! per-key ordering preserved and memory and latency bounded.
//!
//! Buffered-but-unflushed rows are held in memory only: they are lost
//! if the process terminates. That tradeoff is deliberate; callers
//! needing durability must front the relay with a write-ahead log.

pub mod config;
pub mod ingest;
pub mod relay;
pub mod store;

pub use config::{RelayConfig, RetryConfig, StoreBackend};
pub use relay::{
    Batch, Command, DroppedBatch, RelayEngine, RelayError, RelayStatsSnapshot, Row,
};
pub use store::{FsStore, InMemoryStore, SimulatedStore, StoreClient, StoreError};
