//! The memory monitor: rolling history, current level, and subscribers.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use idelens_common::clock::SharedClock;
use idelens_common::config::MemoryConfig;
use idelens_common::error::IdelensResult;
use idelens_platform_core::MemoryProbe;
use idelens_window_model::{MemoryAllocationAssessment, PressureChange, RiskLevel};
use parking_lot::Mutex;

use crate::assessment::{assess_sample, derive_level, is_rapid_growth, MemorySnapshot};

/// Callback fired on every pressure level transition.
pub type PressureListener = Arc<dyn Fn(&PressureChange) + Send + Sync>;

/// Handle returned by [`MemoryMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub(crate) struct Inner {
    probe: Arc<dyn MemoryProbe>,
    pub(crate) config: MemoryConfig,
    clock: SharedClock,
    history: Mutex<VecDeque<MemorySnapshot>>,
    level: Mutex<RiskLevel>,
    listeners: Mutex<Vec<(SubscriptionId, PressureListener)>>,
    next_subscription: AtomicU64,
}

/// Samples memory and assesses allocations. Clones share state.
#[derive(Clone)]
pub struct MemoryMonitor {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("level", &self.current_level())
            .field("history", &self.inner.history.lock().len())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

impl MemoryMonitor {
    pub fn new(probe: Arc<dyn MemoryProbe>, config: MemoryConfig, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                probe,
                config,
                clock,
                history: Mutex::new(VecDeque::new()),
                level: Mutex::new(RiskLevel::Normal),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Level derived from the most recent sample.
    pub fn current_level(&self) -> RiskLevel {
        *self.inner.level.lock()
    }

    /// Snapshots in the rolling window, oldest first.
    pub fn history(&self) -> Vec<MemorySnapshot> {
        self.inner.history.lock().iter().copied().collect()
    }

    pub fn latest(&self) -> Option<MemorySnapshot> {
        self.inner.history.lock().back().copied()
    }

    /// Take a sample, append it to the history, and notify subscribers if
    /// the level changed.
    pub fn sample_now(&self) -> IdelensResult<MemorySnapshot> {
        let sample = self.inner.probe.sample()?;
        let snapshot = MemorySnapshot::from_sample(sample, self.inner.clock.wall());
        let config = &self.inner.config;

        let rapid = {
            let mut history = self.inner.history.lock();
            history.push_back(snapshot);
            while history.len() > config.history_len.max(1) {
                history.pop_front();
            }
            let history = history.make_contiguous();
            is_rapid_growth(
                history,
                config.trend_window,
                config.trend_growth_bytes_per_sample,
            )
        };

        let level = derive_level(config, &sample, rapid);
        let previous = std::mem::replace(&mut *self.inner.level.lock(), level);
        if previous != level {
            let change = PressureChange {
                previous,
                current: level,
                process_bytes: sample.process_bytes,
            };
            self.notify(&change);
        }
        Ok(snapshot)
    }

    /// Assess allocating `requested_bytes` against a fresh sample and the
    /// recent trend. The fresh sample is not added to the history.
    pub fn assess(
        &self,
        requested_bytes: u64,
        context: &str,
    ) -> IdelensResult<MemoryAllocationAssessment> {
        let sample = self.inner.probe.sample()?;
        let rapid = {
            let mut history = self.inner.history.lock();
            is_rapid_growth(
                history.make_contiguous(),
                self.inner.config.trend_window,
                self.inner.config.trend_growth_bytes_per_sample,
            )
        };
        let assessment = assess_sample(&self.inner.config, &sample, requested_bytes, rapid, context);
        match assessment.risk_level {
            RiskLevel::Normal => tracing::trace!(
                context,
                requested = requested_bytes,
                projected = assessment.projected_bytes,
                "Allocation assessed"
            ),
            RiskLevel::Warning => tracing::info!(
                context,
                requested = requested_bytes,
                projected = assessment.projected_bytes,
                "Allocation assessed at warning level"
            ),
            level => tracing::warn!(
                context,
                ?level,
                requested = requested_bytes,
                projected = assessment.projected_bytes,
                "Allocation assessed at high risk"
            ),
        }
        Ok(assessment)
    }

    /// Register a callback for level transitions.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&PressureChange) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    fn notify(&self, change: &PressureChange) {
        tracing::info!(
            previous = ?change.previous,
            current = ?change.current,
            process_bytes = change.process_bytes,
            "Memory pressure level changed"
        );
        // Listeners run outside the lock so they may subscribe or unsubscribe.
        let listeners: Vec<PressureListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(change))).is_err() {
                tracing::error!("Memory pressure listener panicked");
            }
        }
    }
}
