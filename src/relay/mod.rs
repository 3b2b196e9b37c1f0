//! Write-Buffering Relay Core
//!
//! Accumulates incoming write commands per target key and flushes them
//! as batches to the downstream store, amortizing per-write overhead
//! while preserving per-key ordering.
//!
//! ## Architecture
//!
//! ```text
//! Command → RelayEngine.submit → BufferRegistry → KeyedBuffer.append
//!                                                       │
//!                                     FlushTrigger (size / delay timer)
//!                                                       │
//!                                 KeyedBuffer.drain → BatchWriter → store
//! ```
//!
//! Concurrency is per-key: producers append concurrently under one
//! short-held mutex per key, and at most one flush per key is in flight
//! at a time. Buffered-but-unflushed rows live only in memory and are
//! lost if the process terminates. That is the tradeoff this relay
//! makes for batched downstream writes.

pub mod buffer;
pub mod command;
pub mod engine;
pub mod registry;
pub mod stats;
pub mod sweeper;
pub mod trigger;
pub mod writer;

pub use buffer::{AppendError, Batch, KeyedBuffer};
pub use command::{is_valid_target, Command, Row};
pub use engine::{DroppedBatch, RelayEngine, RelayError};
pub use registry::BufferRegistry;
pub use stats::{RelayStats, RelayStatsSnapshot};
pub use sweeper::IdleSweeper;
pub use trigger::{FlushDecision, FlushTrigger};
pub use writer::BatchWriter;
