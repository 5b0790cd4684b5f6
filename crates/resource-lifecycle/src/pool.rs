//! Named object pools for reusable buffers.
//!
//! A pool holds idle objects of one type, keyed by name. Each pool is capped
//! at `max_pool_size`; returns beyond the cap drop the object.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use idelens_common::error::IdelensResult;
use parking_lot::Mutex;

use crate::manager::ResourceManager;

pub(crate) struct ObjectPools {
    pools: Mutex<HashMap<String, Vec<Box<dyn Any + Send>>>>,
    max_size: usize,
    reuses: AtomicU64,
}

impl ObjectPools {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            max_size,
            reuses: AtomicU64::new(0),
        }
    }

    fn take<T: Send + 'static>(&self, name: &str) -> Option<T> {
        let mut pools = self.pools.lock();
        let pool = pools.get_mut(name)?;
        // Pools are keyed by name; a type mismatch means a caller reused a
        // name for another type, so the object is discarded.
        while let Some(boxed) = pool.pop() {
            match boxed.downcast::<T>() {
                Ok(value) => {
                    self.reuses.fetch_add(1, Ordering::Relaxed);
                    return Some(*value);
                }
                Err(_) => {
                    tracing::warn!(pool = name, "Discarding pooled object of unexpected type");
                }
            }
        }
        None
    }

    fn put<T: Send + 'static>(&self, name: &str, value: T) -> bool {
        let mut pools = self.pools.lock();
        let pool = pools.entry(name.to_string()).or_default();
        if pool.len() >= self.max_size {
            return false;
        }
        pool.push(Box::new(value));
        true
    }

    /// Drop every idle object. Returns how many were dropped.
    pub(crate) fn drain(&self) -> usize {
        let mut pools = self.pools.lock();
        let count = pools.values().map(Vec::len).sum();
        pools.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.pools.lock().values().map(Vec::len).sum()
    }

    pub(crate) fn reuses(&self) -> u64 {
        self.reuses.load(Ordering::Relaxed)
    }
}

impl ResourceManager {
    /// Take an idle object from the named pool, or create one.
    pub fn acquire_from_pool<T, F>(&self, name: &str, create: F) -> IdelensResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> IdelensResult<T>,
    {
        match self.inner.pools.take::<T>(name) {
            Some(value) => {
                tracing::trace!(pool = name, "Reusing pooled object");
                Ok(value)
            }
            None => create(),
        }
    }

    /// Return an object to the named pool. Returns `false` if the pool was
    /// full and the object was dropped.
    pub fn return_to_pool<T: Send + 'static>(&self, name: &str, value: T) -> bool {
        let kept = self.inner.pools.put(name, value);
        if !kept {
            tracing::trace!(pool = name, "Pool full, dropping returned object");
        }
        kept
    }

    /// Drop every pooled object.
    pub fn drain_pools(&self) -> usize {
        let dropped = self.inner.pools.drain();
        if dropped > 0 {
            tracing::debug!(dropped, "Drained object pools");
        }
        dropped
    }
}
