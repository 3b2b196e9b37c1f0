//! Idle-buffer sweeper.
//!
//! Background task that periodically retires buffers left empty past the
//! configured TTL, bounding registry growth when key cardinality is
//! unbounded. Runs only when `idle_ttl` is configured.

use crate::relay::engine::RelayEngine;
use crate::store::StoreClient;
use std::time::Duration;
use tokio::time::interval;
use tracing::debug;

pub struct IdleSweeper<C: StoreClient> {
    engine: RelayEngine<C>,
    ttl: Duration,
}

impl<C: StoreClient> IdleSweeper<C> {
    pub fn new(engine: RelayEngine<C>, ttl: Duration) -> Self {
        IdleSweeper { engine, ttl }
    }

    pub async fn run(self) {
        // Sweep a few times per TTL window so eviction lag stays small.
        let period = (self.ttl / 4).max(Duration::from_millis(100));
        let mut tick = interval(period);

        loop {
            tick.tick().await;
            let evicted = self.engine.evict_idle(self.ttl);
            if evicted > 0 {
                debug!("idle sweep evicted {} buffers", evicted);
            }
        }
    }
}
