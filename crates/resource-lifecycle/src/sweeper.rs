//! Periodic expiry sweep.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::manager::ResourceManager;

/// Handle to a running sweep task. Dropping it cancels the task.
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Cancel the sweep and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Sweeper task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ResourceManager {
    /// Spawn a task that runs [`ResourceManager::sweep_expired`] at the
    /// configured interval. Must be called inside a Tokio runtime.
    pub fn start_sweeper(&self) -> SweeperHandle {
        self.start_sweeper_every(self.config().sweep_interval())
    }

    pub fn start_sweeper_every(&self, period: Duration) -> SweeperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let manager = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            tracing::debug!(period_ms = period.as_millis() as u64, "Lease sweeper started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match manager.sweep_expired() {
                            Ok(0) => {}
                            Ok(count) => tracing::info!(count, "Sweeper released expired leases"),
                            Err(e) => tracing::error!(error = %e, "Sweeper release failed"),
                        }
                    }
                }
            }
            tracing::debug!("Lease sweeper stopped");
        });
        SweeperHandle {
            cancel,
            task: Some(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use idelens_common::clock::ManualClock;
    use idelens_common::config::LifecycleConfig;

    use super::*;
    use crate::manager::ResourceKind;

    #[tokio::test]
    async fn sweeper_releases_expired_leases_and_stops() {
        let clock = ManualClock::shared();
        let manager = ResourceManager::new(LifecycleConfig::default(), clock.clone());
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let lease = manager
            .acquire(
                ResourceKind::DeviceContext,
                "stale-dc",
                || Ok(1u32),
                move |_| {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                Some(Duration::from_secs(5)),
            )
            .unwrap();

        let sweeper = manager.start_sweeper_every(Duration::from_millis(10));
        assert!(sweeper.is_running());
        clock.advance(Duration::from_secs(6));

        for _ in 0..200 {
            if released.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(released.load(Ordering::SeqCst));
        assert!(!manager.is_active(lease.id()));

        sweeper.stop().await;
    }
}
