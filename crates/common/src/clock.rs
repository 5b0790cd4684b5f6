//! Clock abstraction.
//!
//! Cache TTLs, lease ages, idle detection, and result timestamps all read
//! time through a [`Clock`] so tests can move time forward without sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic now, used for ages and expiry.
    fn now(&self) -> Instant;

    /// Wall-clock now, used for timestamps reported to callers.
    fn wall(&self) -> DateTime<Utc>;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    epoch: Instant,
    epoch_wall: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a manual clock anchored to now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Create a shared manual clock. Keep the returned `Arc<ManualClock>` to
    /// advance it and pass a clone as [`SharedClock`] to the component under test.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Total time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + *self.offset.lock()
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(*self.offset.lock()).unwrap_or_default();
        self.epoch_wall + offset
    }
}
