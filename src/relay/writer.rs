//! Batch Writer
//!
//! Turns one drained batch into a single downstream write request and
//! invokes the store client, preserving the batch's append order. Retry
//! policy lives here: bounded attempts with exponential backoff plus
//! jitter. The writer never mutates the batch and never re-inserts it
//! anywhere. Once attempts are exhausted the last error is handed back
//! to the engine, which owns the drop-and-report decision.

use crate::config::RetryConfig;
use crate::relay::buffer::Batch;
use crate::store::{StoreClient, StoreError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct BatchWriter<C: StoreClient> {
    client: Arc<C>,
    retry: RetryConfig,
}

impl<C: StoreClient> BatchWriter<C> {
    pub fn new(client: Arc<C>, retry: RetryConfig) -> Self {
        debug_assert!(
            retry.max_attempts > 0,
            "Precondition: max_attempts must be positive"
        );
        BatchWriter { client, retry }
    }

    /// Write one non-empty batch, retrying up to `max_attempts` total
    /// attempts. Returns the last error once exhausted.
    pub async fn write(&self, batch: &Batch) -> Result<(), StoreError> {
        debug_assert!(!batch.is_empty(), "Precondition: batch must not be empty");

        let mut attempt: u32 = 1;
        loop {
            match self.client.write_batch(batch.key(), batch.rows()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.retry.max_attempts => return Err(e),
                Err(e) => {
                    warn!(
                        "batch write failed for {} (seq {}, {} rows, attempt {}/{}): {}",
                        batch.key(),
                        batch.seq(),
                        batch.len(),
                        attempt,
                        self.retry.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Exponential backoff with jitter: base * 2^(attempt-1) plus up to
    /// half the base of random skew.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry.backoff.as_millis() as u64;
        let shift = (attempt - 1).min(16);
        let delay_ms = base_ms.saturating_mul(1u64 << shift);
        let jitter_ms = if base_ms >= 2 {
            rand::thread_rng().gen_range(0..=base_ms / 2)
        } else {
            0
        };
        Duration::from_millis(delay_ms.saturating_add(jitter_ms))
    }
}
