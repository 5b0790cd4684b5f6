//! The engine's composition root.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use idelens_classification::Classifier;
use idelens_common::clock::SharedClock;
use idelens_common::concurrency::{concurrency_limiter, limiter_permits};
use idelens_common::config::EngineConfig;
use idelens_common::error::{IdelensError, IdelensResult};
use idelens_layout_analysis::LayoutAnalyzer;
use idelens_memory_monitor::{MemoryMonitor, SamplerHandle, SubscriptionId};
use idelens_platform_core::simulated::SimulatedDesktop;
use idelens_platform_core::{
    CapturePrimitive, MemoryProbe, ProcessResolver, WindowHandle, WindowSource,
};
use idelens_resource_lifecycle::{ResourceManager, ResourceStats, SweeperHandle};
use idelens_window_discovery::{SkipCounts, WindowEnumerator};
use idelens_window_model::{
    CaptureOptions, CaptureOutcome, CaptureStage, ClassifiedWindow, CompositeOutcome,
    LayoutAnalysis, PartialFailure, RejectionCode, Window,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{rejection, CaptureOrchestrator};

/// The native collaborators the engine runs against.
#[derive(Clone)]
pub struct Platform {
    pub windows: Arc<dyn WindowSource>,
    pub processes: Arc<dyn ProcessResolver>,
    pub capture: Arc<dyn CapturePrimitive>,
    pub memory: Arc<dyn MemoryProbe>,
}

impl Platform {
    /// Every contract served by one simulated desktop.
    pub fn simulated(desktop: Arc<SimulatedDesktop>) -> Self {
        Self {
            windows: desktop.clone(),
            processes: desktop.clone(),
            capture: desktop.clone(),
            memory: desktop,
        }
    }
}

/// Classified windows from one discovery scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowScan {
    pub windows: Vec<ClassifiedWindow>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub skipped: SkipCounts,
    pub elapsed_ms: u64,
}

impl WindowScan {
    /// The windows with their types filled in.
    pub fn typed_windows(&self) -> Vec<Window> {
        self.windows.iter().map(|c| c.window.clone()).collect()
    }
}

struct Background {
    sweeper: SweeperHandle,
    sampler: SamplerHandle,
}

/// Discovers, classifies, analyzes, and captures IDE windows.
pub struct VisionEngine {
    config: EngineConfig,
    enumerator: WindowEnumerator,
    classifier: Arc<Classifier>,
    layout: LayoutAnalyzer,
    lifecycle: ResourceManager,
    memory: MemoryMonitor,
    orchestrator: CaptureOrchestrator,
    pressure_subscription: SubscriptionId,
    background: Mutex<Option<Background>>,
}

impl std::fmt::Debug for VisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionEngine")
            .field("lifecycle", &self.lifecycle)
            .field("memory", &self.memory)
            .field("running", &self.is_running())
            .finish()
    }
}

impl VisionEngine {
    /// Wire every stage from `config`. Background tasks are not started;
    /// call [`VisionEngine::start`] inside a Tokio runtime for that.
    pub fn new(config: EngineConfig, platform: Platform, clock: SharedClock) -> IdelensResult<Self> {
        config.validate()?;

        let permits = limiter_permits(config.discovery.max_concurrency);
        let limiter = concurrency_limiter(config.discovery.max_concurrency);
        let enumerator = WindowEnumerator::new(
            platform.windows,
            platform.processes,
            config.discovery.clone(),
            limiter.clone(),
        );
        let classifier = Arc::new(Classifier::from_config(
            config.classification.clone(),
            clock.clone(),
        )?);
        let layout = LayoutAnalyzer::from_config(&config.layout);
        let lifecycle = ResourceManager::new(config.lifecycle.clone(), clock.clone());
        let memory = MemoryMonitor::new(platform.memory, config.memory.clone(), clock.clone());

        let on_pressure = lifecycle.clone();
        let pressure_subscription = memory.subscribe(move |change| {
            if let Some(report) = on_pressure.on_memory_pressure(change.current) {
                tracing::info!(
                    level = ?change.current,
                    idle = report.idle,
                    pooled = report.pooled_dropped,
                    "Released resources on memory pressure"
                );
            }
        });

        let orchestrator = CaptureOrchestrator::new(
            platform.capture,
            lifecycle.clone(),
            memory.clone(),
            limiter,
            permits,
            config.capture.clone(),
            clock,
        );

        tracing::debug!(permits, "Vision engine assembled");
        Ok(Self {
            config,
            enumerator,
            classifier,
            layout,
            lifecycle,
            memory,
            orchestrator,
            pressure_subscription,
            background: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    pub fn lifecycle(&self) -> &ResourceManager {
        &self.lifecycle
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Start the expiry sweeper and the memory sampler. Idempotent.
    pub fn start(&self) {
        let mut background = self.background.lock();
        if background.is_some() {
            return;
        }
        *background = Some(Background {
            sweeper: self.lifecycle.start_sweeper(),
            sampler: self.memory.start_sampler(),
        });
        tracing::info!("Vision engine started");
    }

    pub fn is_running(&self) -> bool {
        self.background.lock().is_some()
    }

    /// Stop background tasks and release every outstanding lease.
    pub async fn shutdown(&self) -> IdelensResult<ResourceStats> {
        let background = self.background.lock().take();
        if let Some(background) = background {
            background.sweeper.stop().await;
            background.sampler.stop().await;
        }
        self.memory.unsubscribe(self.pressure_subscription);
        self.lifecycle.drain_pools();
        let released = self
            .lifecycle
            .release_all()
            .map_err(|e| IdelensError::lifecycle(e.to_string()))?;
        let stats = self.lifecycle.stats();
        tracing::info!(
            released,
            acquired = stats.acquired,
            forced = stats.forced,
            failed = stats.failed,
            "Vision engine shut down"
        );
        Ok(stats)
    }

    /// Discover and classify the target application's windows.
    ///
    /// `timeout` defaults to the configured discovery timeout. A timed-out
    /// or cancelled scan returns what it found so far. Expired cache entries
    /// are dropped before each scan.
    pub async fn discover_windows(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> IdelensResult<WindowScan> {
        let timeout = timeout.unwrap_or_else(|| self.config.discovery.timeout());
        let purged = self.classifier.cache().purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired classifications");
        }
        let discovery = self.enumerator.enumerate(timeout, cancel).await?;
        let classifier = self.classifier.clone();
        let windows = discovery.windows;
        let windows = tokio::task::spawn_blocking(move || classifier.classify_all(windows))
            .await
            .map_err(|e| IdelensError::platform(format!("classification task failed: {e}")))?;
        tracing::info!(
            windows = windows.len(),
            skipped = discovery.skipped.total(),
            timed_out = discovery.timed_out,
            "Discovery finished"
        );
        Ok(WindowScan {
            windows,
            timed_out: discovery.timed_out,
            cancelled: discovery.cancelled,
            skipped: discovery.skipped,
            elapsed_ms: discovery.elapsed_ms,
        })
    }

    /// Docking and overlap relationships of classified windows.
    pub fn analyze_layout(&self, windows: &[Window]) -> LayoutAnalysis {
        self.layout.analyze(windows)
    }

    /// Capture one window by identity.
    ///
    /// The window is re-validated and classified first; a window that is
    /// gone or not owned by the target application is rejected as not found.
    pub async fn capture_window(
        &self,
        handle: WindowHandle,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> IdelensResult<CaptureOutcome> {
        let window = match self.resolve(handle, cancel).await {
            Ok(Some(window)) => window,
            Ok(None) => {
                return Ok(CaptureOutcome::Rejected(rejection(
                    RejectionCode::WindowNotFound,
                    format!("window {handle} does not exist or is not part of the target application"),
                    None,
                    &[CaptureStage::Rejected],
                )))
            }
            Err(e) => {
                let code = interrupted(&e).ok_or(e)?;
                return Ok(CaptureOutcome::Rejected(rejection(
                    code,
                    format!("could not validate window {handle}: {code}"),
                    None,
                    &[CaptureStage::Rejected],
                )));
            }
        };
        self.orchestrator.capture(&window, options, cancel).await
    }

    /// Capture several windows concurrently, stitch them, and analyze their
    /// layout. Duplicate identities are captured once.
    pub async fn capture_composite(
        &self,
        handles: &[WindowHandle],
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> IdelensResult<CompositeOutcome> {
        if handles.is_empty() {
            return Err(IdelensError::invalid_argument(
                "composite capture needs at least one window",
            ));
        }
        let mut seen = HashSet::new();
        let mut windows = Vec::new();
        let mut missing = Vec::new();
        for handle in handles.iter().copied().filter(|h| seen.insert(*h)) {
            match self.enumerator.validate_window(handle, cancel).await {
                Ok(Some(window)) => windows.push(window),
                Ok(None) => missing.push(PartialFailure {
                    handle,
                    code: RejectionCode::WindowNotFound,
                    message: format!("window {handle} does not exist or is not part of the target application"),
                }),
                Err(IdelensError::Cancelled { .. }) => {
                    return Ok(CompositeOutcome::Rejected(rejection(
                        RejectionCode::Cancelled,
                        "composite capture cancelled while validating windows",
                        None,
                        &[CaptureStage::Rejected],
                    )))
                }
                Err(e @ IdelensError::Timeout { .. }) => missing.push(PartialFailure {
                    handle,
                    code: RejectionCode::Timeout,
                    message: e.to_string(),
                }),
                Err(e) => return Err(e),
            }
        }
        if windows.is_empty() {
            let (code, message) = if missing.iter().all(|f| f.code == RejectionCode::Timeout) {
                (RejectionCode::Timeout, "validation timed out for every requested window")
            } else {
                (RejectionCode::WindowNotFound, "none of the requested windows exist")
            };
            return Ok(CompositeOutcome::Rejected(rejection(
                code,
                message,
                None,
                &[CaptureStage::Rejected],
            )));
        }

        let windows: Vec<Window> = self
            .classifier
            .classify_all(windows)
            .into_iter()
            .map(|c| c.window)
            .collect();
        let layout = self.layout.analyze(&windows);
        let outcome = self
            .orchestrator
            .capture_composite(&windows, layout, options, cancel)
            .await?;
        Ok(match outcome {
            CompositeOutcome::Completed(mut composite) => {
                missing.append(&mut composite.partial_failures);
                composite.partial_failures = missing;
                CompositeOutcome::Completed(composite)
            }
            rejected => rejected,
        })
    }

    async fn resolve(
        &self,
        handle: WindowHandle,
        cancel: &CancellationToken,
    ) -> IdelensResult<Option<Window>> {
        let Some(mut window) = self.enumerator.validate_window(handle, cancel).await? else {
            return Ok(None);
        };
        window.window_type = self.classifier.classify(&window).window_type;
        Ok(Some(window))
    }
}

/// The rejection code for a validation that ran out of time or was cancelled.
fn interrupted(error: &IdelensError) -> Option<RejectionCode> {
    match error {
        IdelensError::Timeout { .. } => Some(RejectionCode::Timeout),
        IdelensError::Cancelled { .. } => Some(RejectionCode::Cancelled),
        _ => None,
    }
}
