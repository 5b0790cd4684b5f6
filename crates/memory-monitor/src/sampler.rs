//! Background sampling task.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::monitor::MemoryMonitor;

/// Handle to a running sampler. Dropping it cancels the task.
#[derive(Debug)]
pub struct SamplerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Cancel sampling and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Memory sampler ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl MemoryMonitor {
    /// Spawn periodic sampling at the configured interval. Must be called
    /// inside a Tokio runtime.
    pub fn start_sampler(&self) -> SamplerHandle {
        self.start_sampler_every(self.config().sample_interval())
    }

    pub fn start_sampler_every(&self, period: Duration) -> SamplerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let monitor = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::debug!(period_ms = period.as_millis() as u64, "Memory sampler started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let monitor = monitor.clone();
                        match tokio::task::spawn_blocking(move || monitor.sample_now()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => tracing::warn!(error = %e, "Memory sample failed"),
                            Err(e) => tracing::error!(error = %e, "Memory sample task failed"),
                        }
                    }
                }
            }
            tracing::debug!("Memory sampler stopped");
        });
        SamplerHandle {
            cancel,
            task: Some(task),
        }
    }
}
