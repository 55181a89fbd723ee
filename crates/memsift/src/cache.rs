//! A bounded read cache for view-layer refreshes.
//!
//! Owned by whichever session or view needs it, never ambient. Capacity is
//! injected; eviction is least-recently-used. A refresh tick is expected to
//! invalidate before re-reading, so repeated locations within one tick share
//! a single RPC read while ticks always observe fresh memory.

use crate::{process_handle::MemoryRpc, Address};
use lru::LruCache;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReadKey {
    address: Address,
    len: usize,
}

pub struct ReadCache {
    lru: LruCache<ReadKey, Option<Arc<[u8]>>>,
}

impl ReadCache {
    /// Construct a cache holding at most `capacity` distinct reads.
    pub fn new(capacity: usize) -> ReadCache {
        ReadCache {
            lru: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    /// Read through the cache.
    ///
    /// Unreadable results are cached too, so a dead watch does not hammer
    /// the remote service within one tick.
    pub fn read(&mut self, rpc: &dyn MemoryRpc, address: Address, len: usize) -> Option<Arc<[u8]>> {
        let key = ReadKey { address, len };

        if let Some(hit) = self.lru.get(&key) {
            return hit.clone();
        }

        let mut buf = vec![0u8; len];

        let value = match rpc.read_memory(address, &mut buf) {
            Ok(read) if read == len => Some(Arc::from(buf)),
            _ => None,
        };

        self.lru.put(key, value.clone());
        value
    }

    /// Drop every cached read.
    pub fn invalidate(&mut self) {
        let capacity = self.lru.cap();
        self.lru = LruCache::new(capacity);
    }
}
