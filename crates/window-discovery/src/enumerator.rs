//! Bounded, cancellable window enumeration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use idelens_common::config::DiscoveryConfig;
use idelens_common::error::{IdelensError, IdelensResult};
use idelens_platform_core::{
    NativeWindow, ProcessId, ProcessLookupError, ProcessResolver, WindowHandle, WindowSource,
};
use idelens_window_model::{ProcessValidation, ValidationFailure, Window};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::validation::{failure_of, log_skip, validate_owner};
use crate::walk::walk;

/// Per-category counts of windows dropped by one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub hidden: usize,
    pub process_not_found: usize,
    pub terminated: usize,
    pub access_denied: usize,
    pub unexpected_error: usize,
    pub not_target: usize,
    pub not_responding: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.hidden
            + self.process_not_found
            + self.terminated
            + self.access_denied
            + self.unexpected_error
            + self.not_target
            + self.not_responding
    }

    fn record_failure(&mut self, failure: ValidationFailure) {
        match failure {
            ValidationFailure::None => {}
            ValidationFailure::ProcessNotFound => self.process_not_found += 1,
            ValidationFailure::Terminated => self.terminated += 1,
            ValidationFailure::AccessDenied => self.access_denied += 1,
            ValidationFailure::UnexpectedError => self.unexpected_error += 1,
        }
    }
}

/// Result of one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    /// Retained windows in walk order, children lists rebuilt from the
    /// retained set.
    pub windows: Vec<Window>,
    /// The scan hit its timeout; `windows` is partial.
    pub timed_out: bool,
    /// The scan was cancelled; `windows` is partial.
    pub cancelled: bool,
    pub skipped: SkipCounts,
    pub elapsed_ms: u64,
}

impl Discovery {
    pub fn is_complete(&self) -> bool {
        !self.timed_out && !self.cancelled
    }
}

type Validated = (usize, NativeWindow, Result<ProcessValidation, (ProcessId, ProcessLookupError)>);

enum ScanEnd {
    Complete,
    TimedOut,
    Cancelled,
}

/// Walks the native window tree and validates each window's owner.
#[derive(Clone)]
pub struct WindowEnumerator {
    source: Arc<dyn WindowSource>,
    resolver: Arc<dyn ProcessResolver>,
    limiter: Arc<Semaphore>,
    config: DiscoveryConfig,
}

impl std::fmt::Debug for WindowEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowEnumerator")
            .field("config", &self.config)
            .field("permits", &self.limiter.available_permits())
            .finish()
    }
}

impl WindowEnumerator {
    /// `limiter` bounds concurrent process validations and is normally
    /// shared with multi-window capture.
    pub fn new(
        source: Arc<dyn WindowSource>,
        resolver: Arc<dyn ProcessResolver>,
        config: DiscoveryConfig,
        limiter: Arc<Semaphore>,
    ) -> Self {
        Self {
            source,
            resolver,
            limiter,
            config,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Scan with the configured timeout and no external cancellation.
    pub async fn discover(&self) -> IdelensResult<Discovery> {
        self.enumerate(self.config.timeout(), &CancellationToken::new())
            .await
    }

    /// Walk the window tree and return every window owned by a responding,
    /// accessible target process.
    ///
    /// On timeout or cancellation the windows validated so far are returned
    /// with the matching flag set. Only a failure to list the top-level
    /// windows fails the call.
    pub async fn enumerate(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> IdelensResult<Discovery> {
        let started = Instant::now();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let source = self.source.clone();
            let stop = stop.clone();
            let include_hidden = self.config.include_hidden;
            tokio::task::spawn_blocking(move || {
                walk(source.as_ref(), &stop, include_hidden, &tx);
            });
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut tasks: JoinSet<Validated> = JoinSet::new();
        let mut retained: Vec<(usize, Window)> = Vec::new();
        let mut skipped = SkipCounts::default();
        let mut walking = true;

        let end = loop {
            if !walking && tasks.is_empty() {
                break ScanEnd::Complete;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break ScanEnd::Cancelled,
                _ = &mut deadline => break ScanEnd::TimedOut,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok((order, native, outcome)) => {
                        if let Some(window) = self.settle(native, outcome, &mut skipped) {
                            retained.push((order, window));
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Validation task failed, skipping window");
                        skipped.unexpected_error += 1;
                    }
                },
                item = rx.recv(), if walking => match item {
                    Some(Ok((order, native))) => {
                        if !native.visible && !self.config.include_hidden {
                            skipped.hidden += 1;
                            continue;
                        }
                        self.spawn_validation(&mut tasks, order, native);
                    }
                    Some(Err(e)) => {
                        stop.store(true, Ordering::Relaxed);
                        tasks.abort_all();
                        tracing::error!(error = %e, "Could not list top-level windows");
                        return Err(e);
                    }
                    None => walking = false,
                },
            }
        };

        stop.store(true, Ordering::Relaxed);
        tasks.abort_all();

        let elapsed = started.elapsed();
        let (timed_out, cancelled) = match end {
            ScanEnd::Complete => (false, false),
            ScanEnd::TimedOut => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    retained = retained.len(),
                    "Window enumeration timed out, returning partial results"
                );
                (true, false)
            }
            ScanEnd::Cancelled => {
                tracing::info!(retained = retained.len(), "Window enumeration cancelled");
                (false, true)
            }
        };

        let windows = assemble(retained);
        tracing::debug!(
            retained = windows.len(),
            skipped = skipped.total(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Window enumeration finished"
        );
        Ok(Discovery {
            windows,
            timed_out,
            cancelled,
            skipped,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// Re-validate a single window without a full scan.
    ///
    /// Returns `Ok(None)` when the window no longer exists or its owner does
    /// not pass validation; a null handle is a contract violation. The lookup
    /// is bounded by the discovery timeout and fails with
    /// [`IdelensError::Timeout`] or [`IdelensError::Cancelled`].
    pub async fn validate_window(
        &self,
        handle: WindowHandle,
        cancel: &CancellationToken,
    ) -> IdelensResult<Option<Window>> {
        if handle.is_null() {
            return Err(IdelensError::invalid_argument("window handle must not be null"));
        }
        let source = self.source.clone();
        let resolver = self.resolver.clone();
        let targets = self.config.target_processes.clone();
        let lookup = tokio::task::spawn_blocking(move || {
            source.window(handle).map(|native| {
                native.map(|native| {
                    let outcome = validate_owner(resolver.as_ref(), native.handle, &targets);
                    (native, outcome)
                })
            })
        });

        let timeout = self.config.timeout();
        let looked_up = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(IdelensError::cancelled(format!("validation of window {handle}")));
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    window = %handle,
                    timeout_ms = timeout.as_millis() as u64,
                    "Window validation timed out"
                );
                return Err(IdelensError::timeout(
                    format!("validation of window {handle}"),
                    timeout.as_millis() as u64,
                ));
            }
            joined = lookup => joined
                .map_err(|e| IdelensError::platform(format!("window lookup task failed: {e}")))??,
        };

        let Some((native, outcome)) = looked_up else {
            tracing::debug!(window = %handle, "Window no longer exists");
            return Ok(None);
        };
        if !native.visible && !self.config.include_hidden {
            tracing::debug!(window = %handle, "Window is hidden");
            return Ok(None);
        }
        let mut skipped = SkipCounts::default();
        Ok(self.settle(native, outcome, &mut skipped))
    }

    fn spawn_validation(&self, tasks: &mut JoinSet<Validated>, order: usize, native: NativeWindow) {
        let resolver = self.resolver.clone();
        let limiter = self.limiter.clone();
        let targets = self.config.target_processes.clone();
        tasks.spawn(async move {
            let handle = native.handle;
            let permit = limiter.acquire_owned().await;
            let outcome = match permit {
                Ok(_permit) => tokio::task::spawn_blocking(move || {
                    validate_owner(resolver.as_ref(), handle, &targets)
                })
                .await
                .unwrap_or_else(|e| {
                    Err((ProcessId(0), ProcessLookupError::Other(format!("validation panicked: {e}"))))
                }),
                Err(_) => Err((
                    ProcessId(0),
                    ProcessLookupError::Other("concurrency limiter closed".to_string()),
                )),
            };
            (order, native, outcome)
        });
    }

    /// Turn one validation outcome into a retained window or a counted skip.
    fn settle(
        &self,
        native: NativeWindow,
        outcome: Result<ProcessValidation, (ProcessId, ProcessLookupError)>,
        skipped: &mut SkipCounts,
    ) -> Option<Window> {
        let handle = native.handle;
        let validation = match outcome {
            Ok(validation) => validation,
            Err((pid, error)) => {
                log_skip(handle, pid, &error);
                skipped.record_failure(failure_of(&error));
                return None;
            }
        };
        if !validation.is_target_application {
            tracing::trace!(window = %handle, process = %validation.name, "Not a target process");
            skipped.not_target += 1;
            return None;
        }
        if !validation.is_responding {
            tracing::debug!(window = %handle, pid = %validation.process_id, "Owning process is not responding, skipping window");
            skipped.not_responding += 1;
            return None;
        }
        if !validation.is_accepted() {
            skipped.record_failure(validation.failure);
            return None;
        }
        Some(Window::from_native(native, validation.process_id))
    }
}

/// Restore walk order and rebuild children lists from the retained set.
fn assemble(mut retained: Vec<(usize, Window)>) -> Vec<Window> {
    retained.sort_by_key(|(order, _)| *order);
    let mut windows: Vec<Window> = retained.into_iter().map(|(_, w)| w).collect();
    let index: std::collections::HashMap<WindowHandle, usize> = windows
        .iter()
        .enumerate()
        .map(|(i, w)| (w.handle, i))
        .collect();
    for i in 0..windows.len() {
        let child = windows[i].handle;
        if let Some(&parent) = windows[i].parent.as_ref().and_then(|p| index.get(p)) {
            windows[parent].children.push(child);
        }
    }
    windows
}

#[cfg(test)]
mod tests {
    use idelens_common::concurrency::concurrency_limiter;
    use idelens_platform_core::simulated::SimulatedDesktop;
    use idelens_platform_core::Rect;

    use super::*;

    fn enumerator(desktop: Arc<SimulatedDesktop>) -> WindowEnumerator {
        WindowEnumerator::new(
            desktop.clone(),
            desktop,
            DiscoveryConfig::default(),
            concurrency_limiter(Some(4)),
        )
    }

    fn handles(discovery: &Discovery) -> Vec<u64> {
        discovery.windows.iter().map(|w| w.handle.0).collect()
    }

    #[tokio::test]
    async fn retains_only_ide_windows() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        let discovery = enumerator(desktop).discover().await.unwrap();

        assert!(discovery.is_complete());
        assert_eq!(
            handles(&discovery),
            vec![0x1000, 0x1001, 0x1002, 0x1003, 0x1004, 0x1005, 0x1006]
        );
        assert_eq!(discovery.skipped.access_denied, 1);
        assert_eq!(discovery.skipped.not_target, 1);
        assert!(discovery
            .windows
            .iter()
            .all(|w| w.process_id == ProcessId(4200)));
    }

    #[tokio::test]
    async fn access_denied_process_is_excluded_without_error() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        desktop.add_process(4, "devenv");
        desktop.set_process_fault(4, ProcessLookupError::AccessDenied);
        let discovery = enumerator(desktop).discover().await.unwrap();
        assert!(discovery.windows.iter().all(|w| w.process_id != ProcessId(4)));
        assert_eq!(discovery.skipped.access_denied, 1);
    }

    #[tokio::test]
    async fn children_are_rebuilt_from_retained_windows() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        let discovery = enumerator(desktop).discover().await.unwrap();
        let main = &discovery.windows[0];
        assert_eq!(
            main.children,
            vec![
                WindowHandle(0x1001),
                WindowHandle(0x1002),
                WindowHandle(0x1003),
                WindowHandle(0x1004),
                WindowHandle(0x1005),
            ]
        );
        let editor = discovery
            .windows
            .iter()
            .find(|w| w.handle == WindowHandle(0x1005))
            .unwrap();
        assert_eq!(editor.children, vec![WindowHandle(0x1006)]);
    }

    #[tokio::test]
    async fn failures_are_skipped_by_category() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        desktop.add_process(7000, "devenv");
        desktop.set_process_exited(7000, true);
        desktop.add_process(7100, "devenv");
        desktop.set_process_responding(7100, false);
        desktop.add_process(7200, "devenv");
        desktop.set_process_fault(7200, ProcessLookupError::Other("handle table corrupt".into()));
        for (pid, handle) in [(7000, 0x7000), (7100, 0x7100), (7200, 0x7200)] {
            desktop.add_window(
                pid,
                NativeWindow {
                    handle: WindowHandle(handle),
                    parent: None,
                    title: "Microsoft Visual Studio".into(),
                    class_name: "HwndWrapper".into(),
                    visible: true,
                    rect: Rect::new(0, 0, 100, 100),
                },
            );
        }

        let discovery = enumerator(desktop).discover().await.unwrap();
        assert_eq!(discovery.windows.len(), 7);
        assert_eq!(discovery.skipped.terminated, 1);
        assert_eq!(discovery.skipped.not_responding, 1);
        assert_eq!(discovery.skipped.unexpected_error, 1);
    }

    #[tokio::test]
    async fn timeout_returns_partial_results() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        desktop.set_describe_delay(Duration::from_millis(300));
        let discovery = enumerator(desktop)
            .enumerate(Duration::from_millis(50), &CancellationToken::new())
            .await
            .unwrap();
        assert!(discovery.timed_out);
        assert!(!discovery.cancelled);
        assert!(discovery.windows.len() < 7);
    }

    #[tokio::test]
    async fn slow_walk_is_bounded_by_the_timeout() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        desktop.set_walk_delay(Duration::from_millis(300));
        let discovery = enumerator(desktop)
            .enumerate(Duration::from_millis(30), &CancellationToken::new())
            .await
            .unwrap();
        assert!(discovery.timed_out);
        assert!(discovery.windows.is_empty());
    }

    #[tokio::test]
    async fn cancellation_ends_the_scan() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        desktop.set_describe_delay(Duration::from_millis(300));
        let token = CancellationToken::new();
        token.cancel();
        let discovery = enumerator(desktop)
            .enumerate(Duration::from_secs(30), &token)
            .await
            .unwrap();
        assert!(discovery.cancelled);
        assert!(discovery.windows.is_empty());
    }

    #[tokio::test]
    async fn hidden_windows_are_skipped() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        desktop.add_window(
            4200,
            NativeWindow {
                handle: WindowHandle(0x1100),
                parent: None,
                title: "Find and Replace".into(),
                class_name: "#32770".into(),
                visible: false,
                rect: Rect::new(0, 0, 400, 200),
            },
        );
        let discovery = enumerator(desktop).discover().await.unwrap();
        assert_eq!(discovery.skipped.hidden, 1);
        assert!(!handles(&discovery).contains(&0x1100));
    }

    #[tokio::test]
    async fn validate_window_checks_one_handle() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        let enumerator = enumerator(desktop.clone());
        let cancel = CancellationToken::new();

        let window = enumerator
            .validate_window(WindowHandle(0x1002), &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(window.title, "Solution Explorer");

        desktop.remove_window(WindowHandle(0x1003));
        assert!(enumerator
            .validate_window(WindowHandle(0x1003), &cancel)
            .await
            .unwrap()
            .is_none());

        assert!(enumerator
            .validate_window(WindowHandle(0x2000), &cancel)
            .await
            .unwrap()
            .is_none());
        assert!(enumerator
            .validate_window(WindowHandle(0xdead), &cancel)
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            enumerator.validate_window(WindowHandle::NULL, &cancel).await,
            Err(IdelensError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn slow_validation_times_out_or_cancels() {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        desktop.set_describe_delay(Duration::from_millis(300));
        let enumerator = WindowEnumerator::new(
            desktop.clone(),
            desktop,
            DiscoveryConfig {
                timeout_ms: 30,
                ..DiscoveryConfig::default()
            },
            concurrency_limiter(Some(4)),
        );

        let err = enumerator
            .validate_window(WindowHandle(0x1002), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IdelensError::Timeout { elapsed_ms: 30, .. }));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = enumerator
            .validate_window(WindowHandle(0x1002), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, IdelensError::Cancelled { .. }));
    }
}
