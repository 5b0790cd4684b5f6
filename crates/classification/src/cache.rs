//! Time-bounded classification cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use idelens_common::clock::SharedClock;
use idelens_platform_core::WindowHandle;
use idelens_window_model::ClassificationResult;
use parking_lot::RwLock;

struct Entry {
    result: ClassificationResult,
    stored_at: Instant,
}

/// Classification results keyed by window handle, each valid for `ttl`.
///
/// Safe for concurrent readers and writers. Expired entries are ignored on
/// lookup and removed by [`ClassificationCache::purge_expired`].
pub struct ClassificationCache {
    entries: RwLock<HashMap<WindowHandle, Entry>>,
    ttl: Duration,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ClassificationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

impl ClassificationCache {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A live entry for `handle`.
    pub fn get(&self, handle: WindowHandle) -> Option<ClassificationResult> {
        let now = self.clock.now();
        let found = self
            .entries
            .read()
            .get(&handle)
            .filter(|e| now.saturating_duration_since(e.stored_at) < self.ttl)
            .map(|e| e.result.clone());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Look up without touching the hit/miss counters.
    pub fn peek(&self, handle: WindowHandle) -> Option<ClassificationResult> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(&handle)
            .filter(|e| now.saturating_duration_since(e.stored_at) < self.ttl)
            .map(|e| e.result.clone())
    }

    pub fn insert(&self, result: ClassificationResult) {
        let entry = Entry {
            stored_at: self.clock.now(),
            result,
        };
        self.entries.write().insert(entry.result.handle, entry);
    }

    /// Drop a single entry.
    pub fn invalidate(&self, handle: WindowHandle) -> bool {
        self.entries.write().remove(&handle).is_some()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.stored_at) < self.ttl);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
