//! Buffer Registry
//!
//! Owns the `Key → KeyedBuffer` map. Buffers are created lazily on first
//! use; a construct race under concurrent first access resolves to
//! exactly one surviving instance. There is no remove operation in the
//! hot path: keys persist for the process lifetime unless idle eviction
//! is enabled, in which case empty buffers idle past a TTL are retired
//! under their own lock (so a racing append fails and re-resolves) and
//! dropped from the map.

use crate::relay::buffer::KeyedBuffer;
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct BufferRegistry {
    buffers: RwLock<HashMap<String, Arc<KeyedBuffer>, RandomState>>,
    max_pending_per_key: usize,
}

impl BufferRegistry {
    pub fn new(max_pending_per_key: usize) -> Self {
        debug_assert!(
            max_pending_per_key > 0,
            "Precondition: max_pending_per_key must be positive"
        );
        BufferRegistry {
            buffers: RwLock::new(HashMap::with_hasher(RandomState::new())),
            max_pending_per_key,
        }
    }

    /// Existing buffer for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<KeyedBuffer>> {
        self.buffers.read().get(key).cloned()
    }

    /// The buffer for `key`, constructing it if absent. Under a
    /// concurrent construct race exactly one instance is registered and
    /// every caller observes it.
    pub fn get_or_create(&self, key: &str) -> Arc<KeyedBuffer> {
        if let Some(buf) = self.buffers.read().get(key) {
            return buf.clone();
        }

        let mut buffers = self.buffers.write();
        buffers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(KeyedBuffer::new(key.to_string(), self.max_pending_per_key))
            })
            .clone()
    }

    /// Keys currently registered, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.buffers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }

    /// Retire and remove buffers that are empty and idle past `ttl`.
    /// Returns the number evicted. Retirement happens inside the map's
    /// write lock, so no new resolution of the key can observe the
    /// retired instance.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let mut buffers = self.buffers.write();
        let before = buffers.len();
        buffers.retain(|_, buf| !buf.retire_if_idle(ttl));
        before - buffers.len()
    }
}
