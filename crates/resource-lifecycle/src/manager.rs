//! The lease registry.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use idelens_common::clock::SharedClock;
use idelens_common::config::LifecycleConfig;
use idelens_common::error::IdelensResult;
use idelens_window_model::RiskLevel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::pool::ObjectPools;
use crate::scope::LeaseScope;

/// What a lease holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    DeviceContext,
    NativeHandle,
    PooledObject,
    PixelBuffer,
}

/// Registry identity of one lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeaseId(pub u64);

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lease#{}", self.0)
    }
}

/// A tracked acquisition. The holder owes exactly one release, either
/// through [`ResourceManager::release`] or through the scope it came from.
#[derive(Debug)]
pub struct Lease<T> {
    id: LeaseId,
    value: T,
}

impl<T> Lease<T> {
    pub fn id(&self) -> LeaseId {
        self.id
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

type ReleaseAction = Box<dyn FnOnce() -> IdelensResult<()> + Send>;

struct LeaseEntry {
    id: LeaseId,
    kind: ResourceKind,
    label: String,
    acquired_at: Instant,
    last_used: Instant,
    max_lifetime: Option<Duration>,
    release: ReleaseAction,
}

/// One release action that failed or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub id: LeaseId,
    pub kind: ResourceKind,
    pub label: String,
    pub message: String,
}

/// Every failure of one release pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} release action(s) failed: {}", .failures.len(), summarize(.failures))]
pub struct ReleaseErrors {
    pub failures: Vec<ReleaseFailure>,
}

fn summarize(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}): {}", f.id, f.label, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why a batch of leases is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReleaseCause {
    Explicit,
    Scope,
    Expired,
    Idle,
    Disposal,
}

/// Counters for instrumentation and leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    /// Leases currently registered.
    pub active: usize,
    pub acquired: u64,
    /// Release actions run, successful or not.
    pub released: u64,
    /// Releases forced by the expiry sweep or idle cleanup.
    pub forced: u64,
    pub failed: u64,
    /// Objects currently idle across all pools.
    pub pooled: usize,
    pub pool_reuses: u64,
}

/// Outcome of a forced cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub expired: usize,
    pub idle: usize,
    pub pooled_dropped: usize,
    pub errors: Option<ReleaseErrors>,
}

#[derive(Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    forced: AtomicU64,
    failed: AtomicU64,
}

pub(crate) struct Inner {
    registry: Mutex<Vec<LeaseEntry>>,
    pub(crate) pools: ObjectPools,
    next_id: AtomicU64,
    clock: SharedClock,
    config: LifecycleConfig,
    counters: Counters,
}

/// Owns the lease registry and object pools. Cheap to clone; clones share
/// the same registry.
#[derive(Clone)]
pub struct ResourceManager {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ResourceManager {
    pub fn new(config: LifecycleConfig, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Vec::new()),
                pools: ObjectPools::new(config.max_pool_size),
                next_id: AtomicU64::new(1),
                clock,
                config,
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    /// Acquire a resource and register its release action.
    ///
    /// `factory` runs first; nothing is registered if it fails. `release`
    /// receives a clone of the acquired value and runs exactly once.
    /// `max_lifetime` falls back to the configured default.
    pub fn acquire<T, F, R>(
        &self,
        kind: ResourceKind,
        label: &str,
        factory: F,
        release: R,
        max_lifetime: Option<Duration>,
    ) -> IdelensResult<Lease<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> IdelensResult<T>,
        R: FnOnce(T) -> IdelensResult<()> + Send + 'static,
    {
        let value = factory()?;
        let id = LeaseId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let now = self.inner.clock.now();
        let owned = value.clone();
        let entry = LeaseEntry {
            id,
            kind,
            label: label.to_string(),
            acquired_at: now,
            last_used: now,
            max_lifetime: max_lifetime.or_else(|| self.inner.config.default_max_lifetime()),
            release: Box::new(move || release(owned)),
        };
        self.inner.registry.lock().push(entry);
        self.inner.counters.acquired.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(%id, ?kind, label, "Lease acquired");
        Ok(Lease { id, value })
    }

    /// Release one lease. Returns `Ok(false)` if it was already released.
    pub fn release(&self, id: LeaseId) -> Result<bool, ReleaseErrors> {
        let entry = {
            let mut registry = self.inner.registry.lock();
            registry
                .iter()
                .position(|e| e.id == id)
                .map(|idx| registry.remove(idx))
        };
        match entry {
            Some(entry) => {
                self.run_batch(vec![entry], ReleaseCause::Explicit)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Mark a lease as in use, resetting its idle time.
    pub fn touch(&self, id: LeaseId) {
        let now = self.inner.clock.now();
        if let Some(entry) = self.inner.registry.lock().iter_mut().find(|e| e.id == id) {
            entry.last_used = now;
        }
    }

    /// Whether `id` is still registered.
    pub fn is_active(&self, id: LeaseId) -> bool {
        self.inner.registry.lock().iter().any(|e| e.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Open a scope that releases its leases in reverse order on exit.
    pub fn scope(&self, name: &str) -> LeaseScope {
        LeaseScope::new(self.clone(), name)
    }

    /// Release a set of leases (those still registered) in reverse acquisition order.
    pub(crate) fn release_set(&self, ids: &[LeaseId]) -> Result<usize, ReleaseErrors> {
        let batch = self.take_matching(|e| ids.contains(&e.id));
        let count = batch.len();
        self.run_batch(batch, ReleaseCause::Scope)?;
        Ok(count)
    }

    /// Release every registered lease, newest first.
    pub fn release_all(&self) -> Result<usize, ReleaseErrors> {
        let batch = self.take_matching(|_| true);
        let count = batch.len();
        if count > 0 {
            tracing::debug!(count, "Disposing all leases");
        }
        self.run_batch(batch, ReleaseCause::Disposal)?;
        Ok(count)
    }

    /// Force-release leases older than their max lifetime.
    pub fn sweep_expired(&self) -> Result<usize, ReleaseErrors> {
        let now = self.inner.clock.now();
        let batch = self.take_matching(|e| {
            e.max_lifetime
                .is_some_and(|max| now.saturating_duration_since(e.acquired_at) > max)
        });
        let count = batch.len();
        self.run_batch(batch, ReleaseCause::Expired)?;
        Ok(count)
    }

    /// Force-release leases untouched for longer than `threshold`.
    pub fn release_idle(&self, threshold: Duration) -> Result<usize, ReleaseErrors> {
        let now = self.inner.clock.now();
        let batch =
            self.take_matching(|e| now.saturating_duration_since(e.last_used) > threshold);
        let count = batch.len();
        self.run_batch(batch, ReleaseCause::Idle)?;
        Ok(count)
    }

    /// React to a memory pressure level. At high levels idle leases are
    /// released and pools drained.
    pub fn on_memory_pressure(&self, level: RiskLevel) -> Option<CleanupReport> {
        if !level.is_high() {
            return None;
        }
        tracing::info!(?level, "Memory pressure high, releasing idle resources");
        let mut report = CleanupReport::default();
        match self.release_idle(self.inner.config.idle_threshold()) {
            Ok(n) => report.idle = n,
            Err(e) => report.errors = Some(e),
        }
        report.pooled_dropped = self.inner.pools.drain();
        Some(report)
    }

    /// Full cleanup pass: expired leases, idle leases, and pooled objects.
    pub fn force_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut failures = Vec::new();
        match self.sweep_expired() {
            Ok(n) => report.expired = n,
            Err(e) => failures.extend(e.failures),
        }
        match self.release_idle(self.inner.config.idle_threshold()) {
            Ok(n) => report.idle = n,
            Err(e) => failures.extend(e.failures),
        }
        report.pooled_dropped = self.inner.pools.drain();
        if !failures.is_empty() {
            report.errors = Some(ReleaseErrors { failures });
        }
        tracing::info!(
            expired = report.expired,
            idle = report.idle,
            pooled = report.pooled_dropped,
            "Forced cleanup pass finished"
        );
        report
    }

    pub fn stats(&self) -> ResourceStats {
        let c = &self.inner.counters;
        ResourceStats {
            active: self.active_count(),
            acquired: c.acquired.load(Ordering::SeqCst),
            released: c.released.load(Ordering::SeqCst),
            forced: c.forced.load(Ordering::SeqCst),
            failed: c.failed.load(Ordering::SeqCst),
            pooled: self.inner.pools.len(),
            pool_reuses: self.inner.pools.reuses(),
        }
    }

    /// Remove matching entries from the registry, preserving acquisition order.
    fn take_matching(&self, mut pred: impl FnMut(&LeaseEntry) -> bool) -> Vec<LeaseEntry> {
        let mut registry = self.inner.registry.lock();
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(registry.len());
        for entry in registry.drain(..) {
            if pred(&entry) {
                taken.push(entry);
            } else {
                kept.push(entry);
            }
        }
        *registry = kept;
        taken
    }

    /// Run release actions newest-first, outside the registry lock.
    fn run_batch(&self, batch: Vec<LeaseEntry>, cause: ReleaseCause) -> Result<(), ReleaseErrors> {
        self.inner.run_batch(batch, cause)
    }
}

impl Inner {
    fn run_batch(&self, batch: Vec<LeaseEntry>, cause: ReleaseCause) -> Result<(), ReleaseErrors> {
        let mut failures = Vec::new();
        let now = self.clock.now();
        for entry in batch.into_iter().rev() {
            let LeaseEntry {
                id,
                kind,
                label,
                acquired_at,
                release,
                ..
            } = entry;
            let age = now.saturating_duration_since(acquired_at);
            match cause {
                ReleaseCause::Expired => {
                    tracing::warn!(%id, ?kind, label, age_secs = age.as_secs(), "Force-releasing expired lease");
                    self.counters.forced.fetch_add(1, Ordering::SeqCst);
                }
                ReleaseCause::Idle => {
                    tracing::info!(%id, ?kind, label, age_secs = age.as_secs(), "Releasing idle lease");
                    self.counters.forced.fetch_add(1, Ordering::SeqCst);
                }
                _ => tracing::trace!(%id, ?kind, label, ?cause, "Releasing lease"),
            }

            let outcome = catch_unwind(AssertUnwindSafe(release));
            self.counters.released.fetch_add(1, Ordering::SeqCst);
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            tracing::error!(%id, ?kind, label, error = %message, "Release action failed");
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            failures.push(ReleaseFailure {
                id,
                kind,
                label,
                message,
            });
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReleaseErrors { failures })
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let remaining = std::mem::take(&mut *self.registry.lock());
        if remaining.is_empty() {
            return;
        }
        tracing::warn!(count = remaining.len(), "Resource manager dropped with live leases");
        if let Err(e) = self.run_batch(remaining, ReleaseCause::Disposal) {
            tracing::error!(error = %e, "Disposal on drop reported release failures");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("release action panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("release action panicked: {s}")
    } else {
        "release action panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idelens_common::clock::ManualClock;
    use idelens_common::error::IdelensError;

    fn manager() -> (ResourceManager, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        let manager = ResourceManager::new(LifecycleConfig::default(), clock.clone());
        (manager, clock)
    }

    fn log_release(log: &Arc<Mutex<Vec<u32>>>) -> impl FnOnce(u32) -> IdelensResult<()> + Send {
        let log = log.clone();
        move |v| {
            log.lock().push(v);
            Ok(())
        }
    }

    #[test]
    fn release_is_idempotent() {
        let (manager, _) = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let lease = manager
            .acquire(ResourceKind::NativeHandle, "h", || Ok(7u32), log_release(&log), None)
            .unwrap();
        assert_eq!(*lease.value(), 7);
        assert!(manager.release(lease.id()).unwrap());
        assert!(!manager.release(lease.id()).unwrap());
        assert_eq!(*log.lock(), vec![7]);
        assert_eq!(manager.stats().released, 1);
    }

    #[test]
    fn failed_factory_registers_nothing() {
        let (manager, _) = manager();
        let result = manager.acquire(
            ResourceKind::DeviceContext,
            "dc",
            || Err::<u32, _>(IdelensError::platform("GetWindowDC failed")),
            |_| Ok(()),
            None,
        );
        assert!(result.is_err());
        assert_eq!(manager.stats().acquired, 0);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn release_all_runs_in_reverse_acquisition_order() {
        let (manager, _) = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        for v in 1..=4u32 {
            manager
                .acquire(ResourceKind::NativeHandle, "h", move || Ok(v), log_release(&log), None)
                .unwrap();
        }
        assert_eq!(manager.release_all().unwrap(), 4);
        assert_eq!(*log.lock(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn failing_release_does_not_stop_the_batch() {
        let (manager, _) = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        manager
            .acquire(ResourceKind::NativeHandle, "first", || Ok(1u32), log_release(&log), None)
            .unwrap();
        manager
            .acquire(
                ResourceKind::NativeHandle,
                "errs",
                || Ok(2u32),
                |_| Err(IdelensError::platform("CloseHandle failed")),
                None,
            )
            .unwrap();
        manager
            .acquire(
                ResourceKind::NativeHandle,
                "panics",
                || Ok(3u32),
                |_| -> IdelensResult<()> { panic!("double free") },
                None,
            )
            .unwrap();
        manager
            .acquire(ResourceKind::NativeHandle, "last", || Ok(4u32), log_release(&log), None)
            .unwrap();

        let err = manager.release_all().unwrap_err();
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].label, "panics");
        assert!(err.failures[0].message.contains("double free"));
        assert_eq!(err.failures[1].label, "errs");
        assert_eq!(*log.lock(), vec![4, 1]);

        let stats = manager.stats();
        assert_eq!(stats.released, 4);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.active, 0);
    }

    #[test]
    fn sweep_releases_only_expired_leases() {
        let (manager, clock) = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        manager
            .acquire(
                ResourceKind::DeviceContext,
                "short",
                || Ok(1u32),
                log_release(&log),
                Some(Duration::from_secs(30)),
            )
            .unwrap();
        let keep = manager
            .acquire(ResourceKind::NativeHandle, "unbounded", || Ok(2u32), log_release(&log), None)
            .unwrap();

        clock.advance(Duration::from_secs(10));
        assert_eq!(manager.sweep_expired().unwrap(), 0);

        clock.advance(Duration::from_secs(25));
        assert_eq!(manager.sweep_expired().unwrap(), 1);
        assert_eq!(*log.lock(), vec![1]);
        assert!(manager.is_active(keep.id()));
        assert_eq!(manager.stats().forced, 1);
    }

    #[test]
    fn high_pressure_releases_idle_leases_and_drains_pools() {
        let (manager, clock) = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let idle = manager
            .acquire(ResourceKind::PixelBuffer, "idle", || Ok(1u32), log_release(&log), None)
            .unwrap();
        let busy = manager
            .acquire(ResourceKind::PixelBuffer, "busy", || Ok(2u32), log_release(&log), None)
            .unwrap();
        manager.return_to_pool("buffers", vec![0u8; 16]);

        clock.advance(Duration::from_secs(400));
        manager.touch(busy.id());

        assert!(manager.on_memory_pressure(RiskLevel::Warning).is_none());
        let report = manager.on_memory_pressure(RiskLevel::Critical).unwrap();
        assert_eq!(report.idle, 1);
        assert_eq!(report.pooled_dropped, 1);
        assert!(!manager.is_active(idle.id()));
        assert!(manager.is_active(busy.id()));
        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn dropping_the_manager_disposes_live_leases() {
        let (manager, _) = manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        manager
            .acquire(ResourceKind::NativeHandle, "a", || Ok(1u32), log_release(&log), None)
            .unwrap();
        manager
            .acquire(ResourceKind::NativeHandle, "b", || Ok(2u32), log_release(&log), None)
            .unwrap();
        drop(manager);
        assert_eq!(*log.lock(), vec![2, 1]);
    }

    #[test]
    fn concurrent_acquire_and_release_balance() {
        let (manager, _) = manager();
        let released = Arc::new(AtomicU64::new(0));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let manager = manager.clone();
                let released = released.clone();
                std::thread::spawn(move || {
                    for i in 0..100u32 {
                        let released = released.clone();
                        let lease = manager
                            .acquire(
                                ResourceKind::DeviceContext,
                                "dc",
                                move || Ok(t * 1000 + i),
                                move |_| {
                                    released.fetch_add(1, Ordering::SeqCst);
                                    Ok(())
                                },
                                None,
                            )
                            .unwrap();
                        manager.release(lease.id()).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let stats = manager.stats();
        assert_eq!(stats.acquired, 800);
        assert_eq!(stats.released, 800);
        assert_eq!(released.load(Ordering::SeqCst), 800);
        assert_eq!(stats.active, 0);
    }
}
