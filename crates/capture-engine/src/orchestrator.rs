//! Per-request capture state machine.
//!
//! ```text
//! Validated -> MemoryAssessed -> StrategySelected -> Capturing
//!           -> (Stitching) -> Annotated -> Completed
//! ```
//!
//! `Rejected` is reachable from `MemoryAssessed` (size ceiling or memory
//! assessment) and from `Capturing` (timeout, cancellation, failed capture).
//! Expected rejections are returned as values; only contract violations are
//! errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use idelens_common::clock::SharedClock;
use idelens_common::config::CaptureConfig;
use idelens_common::error::{IdelensError, IdelensResult};
use idelens_memory_monitor::MemoryMonitor;
use idelens_platform_core::{bounding_rect, CapturePrimitive, PixelBuffer, Rect, WindowHandle};
use idelens_resource_lifecycle::{ResourceKind, ResourceManager};
use idelens_window_model::{
    format_mib, Annotation, CaptureOptions, CaptureOutcome, CaptureRejection, CaptureResult,
    CaptureStage, CompositeCapture, CompositeOutcome, LayoutAnalysis,
    MemoryAllocationAssessment, PartialFailure, RecommendedAction, RejectionCode, Window,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::encode::{encode_png, stitch};
use crate::strategy::{estimate_bytes, CaptureStrategy};

const PNG_SCRATCH_POOL: &str = "png-scratch";

/// Why one window could not be captured.
#[derive(Debug)]
struct Failure {
    code: RejectionCode,
    message: String,
}

impl Failure {
    fn new(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Remediation advice for a rejection code.
pub fn hint_for(code: RejectionCode) -> &'static str {
    match code {
        RejectionCode::ExceedsMaximumSafeLimit => "Reduce the capture region or resolution.",
        RejectionCode::MemoryEmergency => {
            "Retry after closing other applications, or reduce the capture region."
        }
        RejectionCode::RequiresOptimization => {
            "Retry once idle resources have been released, or reduce capture resolution."
        }
        RejectionCode::WindowNotFound => "Run discovery again; the window may have closed.",
        RejectionCode::Timeout => "Retry with a longer timeout or a smaller region.",
        RejectionCode::Cancelled => "Retry the request.",
        RejectionCode::CaptureFailed => "Make sure the window is not minimized, then retry.",
        RejectionCode::AllWindowsFailed => {
            "Check the partial failures and retry the affected windows individually."
        }
    }
}

pub(crate) fn rejection(
    code: RejectionCode,
    message: impl Into<String>,
    assessment: Option<MemoryAllocationAssessment>,
    stages: &[CaptureStage],
) -> CaptureRejection {
    CaptureRejection {
        code,
        message: message.into(),
        hint: hint_for(code).to_string(),
        assessment,
        stages: stages.to_vec(),
    }
}

/// Outcome of the memory gate for an admitted request.
#[derive(Debug)]
struct Admission {
    scale: f32,
    guidance: Option<String>,
    assessment: MemoryAllocationAssessment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectEnd {
    Complete,
    TimedOut,
    Cancelled,
}

/// Drives captures against the native primitive.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    primitive: Arc<dyn CapturePrimitive>,
    lifecycle: ResourceManager,
    memory: MemoryMonitor,
    limiter: Arc<Semaphore>,
    permits: usize,
    config: CaptureConfig,
    clock: SharedClock,
}

impl std::fmt::Debug for CaptureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureOrchestrator")
            .field("config", &self.config)
            .field("permits", &self.permits)
            .finish()
    }
}

impl CaptureOrchestrator {
    /// `limiter` bounds concurrent window captures; `permits` is its size.
    pub fn new(
        primitive: Arc<dyn CapturePrimitive>,
        lifecycle: ResourceManager,
        memory: MemoryMonitor,
        limiter: Arc<Semaphore>,
        permits: usize,
        config: CaptureConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            primitive,
            lifecycle,
            memory,
            limiter,
            permits: permits.max(1),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture one validated, classified window.
    pub async fn capture(
        &self,
        window: &Window,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> IdelensResult<CaptureOutcome> {
        let mut stages = vec![CaptureStage::Validated];
        let strategy = CaptureStrategy::for_type(window.window_type);
        let region = strategy.region(window, options.region)?;
        let requested = estimate_bytes(&region, self.config.bytes_per_pixel);

        if let Some(rejected) = self.check_ceiling(window.handle, requested, &mut stages) {
            return Ok(CaptureOutcome::Rejected(rejected));
        }
        let context = format!("capture {}", window.handle);
        let admission = match self.admit(requested, &context, &mut stages)? {
            Ok(admission) => admission,
            Err(rejected) => return Ok(CaptureOutcome::Rejected(rejected)),
        };

        stages.push(CaptureStage::StrategySelected);
        let timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| strategy.timeout(self.config.single_timeout()));
        tracing::debug!(
            window = %window.handle,
            ?strategy,
            width = region.width,
            height = region.height,
            timeout_ms = timeout.as_millis() as u64,
            "Capturing window"
        );

        stages.push(CaptureStage::Capturing);
        let pixels = match self.shoot(window.handle, region, timeout, cancel).await {
            Ok(pixels) => pixels,
            Err(failure) => {
                stages.push(CaptureStage::Rejected);
                return Ok(CaptureOutcome::Rejected(rejection(
                    failure.code,
                    failure.message,
                    Some(admission.assessment),
                    &stages,
                )));
            }
        };

        let (image, width, height) = match self.encode(pixels, admission.scale).await {
            Ok(encoded) => encoded,
            Err(e) => {
                stages.push(CaptureStage::Rejected);
                return Ok(CaptureOutcome::Rejected(rejection(
                    RejectionCode::CaptureFailed,
                    e.to_string(),
                    Some(admission.assessment),
                    &stages,
                )));
            }
        };

        let annotations = if options.annotate {
            vec![Annotation {
                element: window.window_type,
                bounds: Rect::new(0, 0, width as i32, height as i32),
                label: strategy.label(window),
            }]
        } else {
            Vec::new()
        };
        stages.push(CaptureStage::Annotated);
        stages.push(CaptureStage::Completed);
        tracing::info!(
            window = %window.handle,
            window_type = %window.window_type,
            width,
            height,
            bytes = image.len(),
            "Window captured"
        );

        Ok(CaptureOutcome::Captured(CaptureResult {
            handle: Some(window.handle),
            window_type: window.window_type,
            encoded_len: image.len(),
            image,
            width,
            height,
            scale: admission.scale,
            captured_at: self.clock.wall(),
            annotations,
            guidance: admission.guidance,
            stages,
        }))
    }

    /// Capture several validated windows concurrently and stitch the results.
    ///
    /// Windows that fail are left out and reported as partial failures. The
    /// request is rejected only if the memory gate refuses it, it is
    /// cancelled, or no window could be captured.
    pub async fn capture_composite(
        &self,
        windows: &[Window],
        layout: LayoutAnalysis,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> IdelensResult<CompositeOutcome> {
        if windows.is_empty() {
            return Err(IdelensError::invalid_argument(
                "composite capture needs at least one window",
            ));
        }
        if options.region.is_some() {
            return Err(IdelensError::invalid_argument(
                "composite captures always cover whole windows",
            ));
        }

        let mut stages = vec![CaptureStage::Validated];
        let mut partial_failures = Vec::new();
        let mut planned: Vec<(usize, CaptureStrategy, Rect)> = Vec::with_capacity(windows.len());
        for (idx, window) in windows.iter().enumerate() {
            let strategy = CaptureStrategy::for_type(window.window_type);
            let region = strategy.region(window, None)?;
            let bytes = estimate_bytes(&region, self.config.bytes_per_pixel);
            if bytes > self.config.hard_ceiling_bytes {
                tracing::warn!(
                    window = %window.handle,
                    estimated = bytes,
                    "Window exceeds the capture ceiling, leaving it out"
                );
                partial_failures.push(PartialFailure {
                    handle: window.handle,
                    code: RejectionCode::ExceedsMaximumSafeLimit,
                    message: ceiling_message(bytes, self.config.hard_ceiling_bytes),
                });
                continue;
            }
            planned.push((idx, strategy, region));
        }
        if planned.is_empty() {
            stages.push(CaptureStage::MemoryAssessed);
            stages.push(CaptureStage::Rejected);
            return Ok(CompositeOutcome::Rejected(rejection(
                RejectionCode::ExceedsMaximumSafeLimit,
                "every requested window exceeds the maximum safe limit",
                None,
                &stages,
            )));
        }

        let canvas = bounding_rect(planned.iter().map(|(idx, _, _)| &windows[*idx].rect));
        let canvas_bytes = canvas
            .map(|c| estimate_bytes(&c, self.config.bytes_per_pixel))
            .unwrap_or(0);
        let stitch_allowed = canvas.is_some() && canvas_bytes <= self.config.hard_ceiling_bytes;
        let requested: u64 = planned
            .iter()
            .map(|(_, _, region)| estimate_bytes(region, self.config.bytes_per_pixel))
            .sum::<u64>()
            .saturating_add(if stitch_allowed { canvas_bytes } else { 0 });

        let context = format!("composite capture of {} windows", planned.len());
        let admission = match self.admit(requested, &context, &mut stages)? {
            Ok(admission) => admission,
            Err(rejected) => return Ok(CompositeOutcome::Rejected(rejected)),
        };
        // Each window's own trace starts from the shared admission stages.
        let admitted = stages.clone();
        stages.push(CaptureStage::StrategySelected);

        let base = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.single_timeout());
        let waves = planned.len().div_ceil(self.permits) as u32;
        let longest = planned
            .iter()
            .map(|(_, strategy, _)| strategy.timeout_factor())
            .max()
            .unwrap_or(1);
        let overall = base.saturating_mul(longest).saturating_mul(waves.max(1));

        stages.push(CaptureStage::Capturing);
        let abort = cancel.child_token();
        let mut tasks: JoinSet<(usize, Vec<CaptureStage>, Result<PixelBuffer, Failure>)> =
            JoinSet::new();
        for (idx, strategy, region) in &planned {
            let mut trace = admitted.clone();
            trace.push(CaptureStage::StrategySelected);
            let this = self.clone();
            let token = abort.child_token();
            let handle = windows[*idx].handle;
            let (idx, region) = (*idx, *region);
            let timeout = options
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| strategy.timeout(self.config.single_timeout()));
            tasks.spawn(async move {
                let limiter = this.limiter.clone();
                let permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return (idx, trace, Err(Failure::new(RejectionCode::Cancelled, "cancelled before capture started")));
                    }
                    permit = limiter.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return (idx, trace, Err(Failure::new(RejectionCode::CaptureFailed, "capture limiter closed")));
                };
                trace.push(CaptureStage::Capturing);
                let shot = this.shoot(handle, region, timeout, &token).await;
                (idx, trace, shot)
            });
        }

        let mut shots: Vec<Option<(Vec<CaptureStage>, Result<PixelBuffer, Failure>)>> =
            (0..windows.len()).map(|_| None).collect();
        let deadline = tokio::time::sleep(overall);
        tokio::pin!(deadline);
        let end = loop {
            if tasks.is_empty() {
                break CollectEnd::Complete;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break CollectEnd::Cancelled,
                _ = &mut deadline => break CollectEnd::TimedOut,
                Some(joined) = tasks.join_next() => match joined {
                    Ok((idx, trace, shot)) => shots[idx] = Some((trace, shot)),
                    Err(e) => tracing::error!(error = %e, "Window capture task failed"),
                },
            }
        };

        if end != CollectEnd::Complete {
            // In-flight shots observe the token and return promptly; their
            // device contexts are released when the native call returns.
            abort.cancel();
            while let Some(joined) = tasks.join_next().await {
                if let Ok((idx, trace, shot)) = joined {
                    shots[idx] = Some((trace, shot));
                }
            }
        }
        if end == CollectEnd::Cancelled {
            tracing::info!("Composite capture cancelled");
            stages.push(CaptureStage::Rejected);
            return Ok(CompositeOutcome::Rejected(rejection(
                RejectionCode::Cancelled,
                "composite capture was cancelled",
                Some(admission.assessment),
                &stages,
            )));
        }
        if end == CollectEnd::TimedOut {
            tracing::warn!(
                timeout_ms = overall.as_millis() as u64,
                "Composite capture timed out, keeping finished windows"
            );
        }

        let mut captured: Vec<(usize, PixelBuffer)> = Vec::new();
        let mut traces: Vec<Vec<CaptureStage>> = vec![Vec::new(); windows.len()];
        for (idx, _, _) in &planned {
            let handle = windows[*idx].handle;
            match shots[*idx].take() {
                Some((trace, Ok(pixels))) => {
                    traces[*idx] = trace;
                    captured.push((*idx, pixels));
                }
                Some((_, Err(mut failure))) => {
                    if end == CollectEnd::TimedOut && failure.code == RejectionCode::Cancelled {
                        failure = Failure::new(
                            RejectionCode::Timeout,
                            format!("composite capture exceeded {}ms", overall.as_millis()),
                        );
                    }
                    log_partial(handle, &failure);
                    partial_failures.push(PartialFailure {
                        handle,
                        code: failure.code,
                        message: failure.message,
                    });
                }
                None => partial_failures.push(PartialFailure {
                    handle,
                    code: RejectionCode::CaptureFailed,
                    message: "capture task did not report a result".to_string(),
                }),
            }
        }

        if captured.is_empty() {
            stages.push(CaptureStage::Rejected);
            let summary = partial_failures
                .iter()
                .map(|f| format!("{} ({})", f.handle, f.code))
                .collect::<Vec<_>>()
                .join(", ");
            return Ok(CompositeOutcome::Rejected(rejection(
                RejectionCode::AllWindowsFailed,
                format!("no window could be captured: {summary}"),
                Some(admission.assessment),
                &stages,
            )));
        }

        let stitched_pixels = if stitch_allowed {
            stages.push(CaptureStage::Stitching);
            self.stitch_captured(windows, &captured).await?
        } else {
            tracing::warn!(
                canvas_bytes,
                "Stitched canvas exceeds the capture ceiling, skipping stitching"
            );
            None
        };

        let captured_at = self.clock.wall();
        let mut results = Vec::with_capacity(captured.len());
        for (idx, pixels) in captured.iter() {
            let window = &windows[*idx];
            let (image, width, height) = self.encode(pixels.clone(), admission.scale).await?;
            let mut window_stages = std::mem::take(&mut traces[*idx]);
            window_stages.push(CaptureStage::Annotated);
            window_stages.push(CaptureStage::Completed);
            let annotations = if options.annotate {
                vec![Annotation {
                    element: window.window_type,
                    bounds: Rect::new(0, 0, width as i32, height as i32),
                    label: CaptureStrategy::for_type(window.window_type).label(window),
                }]
            } else {
                Vec::new()
            };
            results.push(CaptureResult {
                handle: Some(window.handle),
                window_type: window.window_type,
                encoded_len: image.len(),
                image,
                width,
                height,
                scale: admission.scale,
                captured_at,
                annotations,
                guidance: admission.guidance.clone(),
                stages: window_stages,
            });
        }

        let stitched = match stitched_pixels {
            Some((bounds, pixels)) => {
                let (image, width, height) = self.encode(pixels, admission.scale).await?;
                let annotations = if options.annotate {
                    captured
                        .iter()
                        .map(|(idx, _)| {
                            let window = &windows[*idx];
                            Annotation {
                                element: window.window_type,
                                bounds: scale_rect(
                                    window.rect.relative_to(bounds.x, bounds.y),
                                    admission.scale,
                                ),
                                label: CaptureStrategy::for_type(window.window_type).label(window),
                            }
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                stages.push(CaptureStage::Annotated);
                stages.push(CaptureStage::Completed);
                Some(CaptureResult {
                    handle: None,
                    window_type: layout
                        .main_window
                        .and_then(|main| windows.iter().find(|w| w.handle == main))
                        .map(|w| w.window_type)
                        .unwrap_or_default(),
                    encoded_len: image.len(),
                    image,
                    width,
                    height,
                    scale: admission.scale,
                    captured_at,
                    annotations,
                    guidance: admission.guidance.clone(),
                    stages: stages.clone(),
                })
            }
            None => None,
        };

        tracing::info!(
            captured = results.len(),
            failed = partial_failures.len(),
            stitched = stitched.is_some(),
            "Composite capture finished"
        );
        Ok(CompositeOutcome::Completed(CompositeCapture {
            windows: results,
            stitched,
            layout,
            partial_failures,
        }))
    }

    fn check_ceiling(
        &self,
        handle: WindowHandle,
        requested: u64,
        stages: &mut Vec<CaptureStage>,
    ) -> Option<CaptureRejection> {
        if requested <= self.config.hard_ceiling_bytes {
            return None;
        }
        tracing::warn!(
            window = %handle,
            estimated = requested,
            ceiling = self.config.hard_ceiling_bytes,
            "Capture rejected before any native call"
        );
        stages.push(CaptureStage::MemoryAssessed);
        stages.push(CaptureStage::Rejected);
        Some(rejection(
            RejectionCode::ExceedsMaximumSafeLimit,
            ceiling_message(requested, self.config.hard_ceiling_bytes),
            None,
            stages,
        ))
    }

    /// Run the memory assessment, forcing one cleanup pass and re-assessing
    /// when it asks for optimization.
    fn admit(
        &self,
        requested: u64,
        context: &str,
        stages: &mut Vec<CaptureStage>,
    ) -> IdelensResult<Result<Admission, CaptureRejection>> {
        let mut assessment = self.memory.assess(requested, context)?;
        if assessment.action == RecommendedAction::RequireOptimization {
            let report = self.lifecycle.force_cleanup();
            if let Some(errors) = &report.errors {
                tracing::warn!(error = %errors, "Cleanup before capture had failures");
            }
            assessment = self.memory.assess(requested, context)?;
        }
        stages.push(CaptureStage::MemoryAssessed);

        match assessment.action {
            RecommendedAction::Reject => {
                stages.push(CaptureStage::Rejected);
                Ok(Err(rejection(
                    RejectionCode::MemoryEmergency,
                    assessment.guidance.clone(),
                    Some(assessment),
                    stages,
                )))
            }
            RecommendedAction::RequireOptimization => {
                stages.push(CaptureStage::Rejected);
                Ok(Err(rejection(
                    RejectionCode::RequiresOptimization,
                    assessment.guidance.clone(),
                    Some(assessment),
                    stages,
                )))
            }
            RecommendedAction::ProceedWithCaution => Ok(Ok(Admission {
                scale: if self.config.downscale_on_warning {
                    0.5
                } else {
                    1.0
                },
                guidance: Some(assessment.guidance.clone()),
                assessment,
            })),
            RecommendedAction::Proceed => Ok(Ok(Admission {
                scale: 1.0,
                guidance: None,
                assessment,
            })),
        }
    }

    /// One native capture on a blocking worker, bounded by `timeout` and
    /// `cancel`.
    async fn shoot(
        &self,
        handle: WindowHandle,
        region: Rect,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PixelBuffer, Failure> {
        let abandoned = Arc::new(AtomicBool::new(false));
        let task = {
            let primitive = self.primitive.clone();
            let lifecycle = self.lifecycle.clone();
            let abandoned = abandoned.clone();
            tokio::task::spawn_blocking(move || {
                capture_blocking(primitive, &lifecycle, handle, region, &abandoned)
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abandoned.store(true, Ordering::SeqCst);
                tracing::info!(window = %handle, "Capture cancelled");
                Err(Failure::new(RejectionCode::Cancelled, format!("capture of {handle} was cancelled")))
            }
            _ = tokio::time::sleep(timeout) => {
                abandoned.store(true, Ordering::SeqCst);
                tracing::warn!(window = %handle, timeout_ms = timeout.as_millis() as u64, "Capture timed out");
                Err(Failure::new(
                    RejectionCode::Timeout,
                    format!("capture of {handle} exceeded {}ms", timeout.as_millis()),
                ))
            }
            joined = task => match joined {
                Ok(shot) => shot,
                Err(e) => {
                    tracing::error!(window = %handle, error = %e, "Capture task failed");
                    Err(Failure::new(RejectionCode::CaptureFailed, format!("capture task failed: {e}")))
                }
            },
        }
    }

    async fn encode(&self, pixels: PixelBuffer, scale: f32) -> IdelensResult<(Vec<u8>, u32, u32)> {
        let lifecycle = self.lifecycle.clone();
        tokio::task::spawn_blocking(move || {
            let mut scratch: Vec<u8> =
                lifecycle.acquire_from_pool(PNG_SCRATCH_POOL, || Ok(Vec::new()))?;
            let encoded = encode_png(&pixels, scale, &mut scratch).map(|(w, h)| (scratch.clone(), w, h));
            lifecycle.return_to_pool(PNG_SCRATCH_POOL, scratch);
            encoded
        })
        .await
        .map_err(|e| IdelensError::capture(format!("encode task failed: {e}")))?
    }

    async fn stitch_captured(
        &self,
        windows: &[Window],
        captured: &[(usize, PixelBuffer)],
    ) -> IdelensResult<Option<(Rect, PixelBuffer)>> {
        let parts: Vec<(Rect, PixelBuffer)> = captured
            .iter()
            .map(|(idx, pixels)| (windows[*idx].rect, pixels.clone()))
            .collect();
        let Some(bounds) = bounding_rect(parts.iter().map(|(rect, _)| rect)) else {
            return Ok(None);
        };
        let stitched = tokio::task::spawn_blocking(move || {
            let borrowed: Vec<(Rect, &PixelBuffer)> = parts.iter().map(|(r, p)| (*r, p)).collect();
            stitch(&borrowed, bounds)
        })
        .await
        .map_err(|e| IdelensError::capture(format!("stitch task failed: {e}")))??;
        Ok(Some((bounds, stitched)))
    }
}

/// Borrow a device context under a lease scope, capture, and release.
fn capture_blocking(
    primitive: Arc<dyn CapturePrimitive>,
    lifecycle: &ResourceManager,
    handle: WindowHandle,
    region: Rect,
    abandoned: &AtomicBool,
) -> Result<PixelBuffer, Failure> {
    let mut scope = lifecycle.scope(&format!("capture {handle}"));
    let acquire_from = primitive.clone();
    let release_to = primitive.clone();
    let dc = match scope.acquire(
        ResourceKind::DeviceContext,
        &format!("device context {handle}"),
        move || acquire_from.acquire_device_context(handle),
        move |dc| release_to.release_device_context(handle, dc),
    ) {
        Ok(lease) => *lease.value(),
        Err(e) => {
            tracing::debug!(window = %handle, error = %e, "Could not open device context");
            return Err(Failure::new(
                RejectionCode::WindowNotFound,
                format!("window {handle} is no longer available: {e}"),
            ));
        }
    };

    let pixels = if abandoned.load(Ordering::SeqCst) {
        None
    } else {
        Some(primitive.capture(
            dc,
            region.x,
            region.y,
            region.width as u32,
            region.height as u32,
        ))
    };
    if let Err(e) = scope.close() {
        tracing::warn!(window = %handle, error = %e, "Device context release failed");
    }

    match pixels {
        None => Err(Failure::new(
            RejectionCode::Cancelled,
            format!("capture of {handle} was abandoned"),
        )),
        Some(pixels) if pixels.is_empty() => Err(Failure::new(
            RejectionCode::CaptureFailed,
            format!("native capture of {handle} returned no pixels"),
        )),
        Some(pixels) => Ok(pixels),
    }
}

fn ceiling_message(requested: u64, ceiling: u64) -> String {
    format!(
        "Estimated capture size {} exceeds maximum safe limit of {}",
        format_mib(requested),
        format_mib(ceiling)
    )
}

fn log_partial(handle: WindowHandle, failure: &Failure) {
    match failure.code {
        RejectionCode::WindowNotFound => {
            tracing::debug!(window = %handle, "Window closed during composite capture")
        }
        _ => tracing::warn!(
            window = %handle,
            code = %failure.code,
            message = %failure.message,
            "Window left out of composite capture"
        ),
    }
}

fn scale_rect(rect: Rect, scale: f32) -> Rect {
    if scale >= 1.0 {
        return rect;
    }
    let s = |v: i32| ((v as f32) * scale).round() as i32;
    Rect::new(s(rect.x), s(rect.y), s(rect.width), s(rect.height))
}

#[cfg(test)]
mod tests {
    use idelens_common::clock::ManualClock;
    use idelens_common::config::{LifecycleConfig, MemoryConfig};
    use idelens_platform_core::simulated::SimulatedDesktop;
    use idelens_platform_core::{NativeWindow, ProcessId, WindowSource};
    use idelens_window_model::WindowType;

    use super::*;

    const MIB: u64 = 1024 * 1024;

    struct Rig {
        desktop: Arc<SimulatedDesktop>,
        lifecycle: ResourceManager,
        orchestrator: CaptureOrchestrator,
    }

    fn rig(config: CaptureConfig) -> Rig {
        let desktop = Arc::new(SimulatedDesktop::ide_session());
        let clock = ManualClock::shared();
        let lifecycle = ResourceManager::new(LifecycleConfig::default(), clock.clone());
        let memory = MemoryMonitor::new(desktop.clone(), MemoryConfig::default(), clock.clone());
        let orchestrator = CaptureOrchestrator::new(
            desktop.clone(),
            lifecycle.clone(),
            memory,
            Arc::new(Semaphore::new(2)),
            2,
            config,
            clock,
        );
        Rig {
            desktop,
            lifecycle,
            orchestrator,
        }
    }

    fn window(desktop: &SimulatedDesktop, handle: u64, window_type: WindowType) -> Window {
        let native: NativeWindow = desktop.window(WindowHandle(handle)).unwrap().unwrap();
        let mut w = Window::from_native(native, ProcessId(4200));
        w.window_type = window_type;
        w
    }

    #[tokio::test]
    async fn tool_pane_capture_runs_every_stage() {
        let rig = rig(CaptureConfig::default());
        let w = window(&rig.desktop, 0x1002, WindowType::SolutionExplorer);
        let outcome = rig
            .orchestrator
            .capture(&w, &CaptureOptions::annotated(), &CancellationToken::new())
            .await
            .unwrap();

        let result = outcome.result().expect("captured");
        assert_eq!((result.width, result.height), (300, 600));
        assert_eq!(result.scale, 1.0);
        assert!(result.guidance.is_none());
        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].label, "Solution Explorer: Solution Explorer");
        assert_eq!(
            result.stages,
            vec![
                CaptureStage::Validated,
                CaptureStage::MemoryAssessed,
                CaptureStage::StrategySelected,
                CaptureStage::Capturing,
                CaptureStage::Annotated,
                CaptureStage::Completed,
            ]
        );
        assert_eq!(rig.desktop.open_device_contexts(), 0);
        assert_eq!(rig.lifecycle.active_count(), 0);
    }

    #[tokio::test]
    async fn ceiling_is_checked_before_the_memory_gate() {
        let rig = rig(CaptureConfig::default());
        let w = window(&rig.desktop, 0x1000, WindowType::MainWindow);
        let options = CaptureOptions::region(Rect::new(0, 0, 8000, 8000));
        let outcome = rig
            .orchestrator
            .capture(&w, &options, &CancellationToken::new())
            .await
            .unwrap();

        let rejected = outcome.rejection().expect("rejected");
        assert_eq!(rejected.code, RejectionCode::ExceedsMaximumSafeLimit);
        assert!(rejected.assessment.is_none());
        assert!(rejected.message.contains("exceeds maximum safe limit"));
        assert_eq!(rig.desktop.device_contexts_acquired(), 0);
        assert_eq!(rig.desktop.capture_calls(), 0);
    }

    #[tokio::test]
    async fn emergency_assessment_rejects_with_guidance() {
        let rig = rig(CaptureConfig::default());
        rig.desktop.set_process_memory(1600 * MIB);
        let w = window(&rig.desktop, 0x1004, WindowType::ErrorList);
        let outcome = rig
            .orchestrator
            .capture(&w, &CaptureOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let rejected = outcome.rejection().expect("rejected");
        assert_eq!(rejected.code, RejectionCode::MemoryEmergency);
        let assessment = rejected.assessment.as_ref().unwrap();
        assert!(!assessment.allow_allocation);
        assert_eq!(rejected.message, assessment.guidance);
        assert_eq!(rig.desktop.capture_calls(), 0);
    }

    #[tokio::test]
    async fn critical_forces_cleanup_then_rejects() {
        let rig = rig(CaptureConfig::default());
        rig.lifecycle.return_to_pool("scratch", vec![0u8; 16]);
        rig.desktop.set_process_memory(1100 * MIB);
        let w = window(&rig.desktop, 0x1004, WindowType::ErrorList);
        let outcome = rig
            .orchestrator
            .capture(&w, &CaptureOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let rejected = outcome.rejection().expect("rejected");
        assert_eq!(rejected.code, RejectionCode::RequiresOptimization);
        assert_eq!(rig.lifecycle.stats().pooled, 0);
        assert_eq!(rig.desktop.capture_calls(), 0);
    }

    #[tokio::test]
    async fn warning_halves_the_output() {
        let rig = rig(CaptureConfig::default());
        rig.desktop.set_process_memory(600 * MIB);
        let w = window(&rig.desktop, 0x1002, WindowType::SolutionExplorer);
        let outcome = rig
            .orchestrator
            .capture(&w, &CaptureOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let result = outcome.result().expect("captured");
        assert_eq!((result.width, result.height), (150, 300));
        assert_eq!(result.scale, 0.5);
        assert!(result.guidance.as_deref().unwrap().contains("warning threshold"));
    }

    #[tokio::test]
    async fn empty_pixels_are_a_capture_failure() {
        let rig = rig(CaptureConfig::default());
        rig.desktop.fail_capture(WindowHandle(0x1003));
        let w = window(&rig.desktop, 0x1003, WindowType::Properties);
        let outcome = rig
            .orchestrator
            .capture(&w, &CaptureOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.rejection().unwrap().code, RejectionCode::CaptureFailed);
        assert_eq!(rig.desktop.device_contexts_acquired(), 1);
        assert_eq!(rig.desktop.device_contexts_released(), 1);
    }

    #[tokio::test]
    async fn timeout_rejects_and_still_releases() {
        let rig = rig(CaptureConfig::default());
        rig.desktop.set_capture_delay(Duration::from_millis(200));
        let w = window(&rig.desktop, 0x1002, WindowType::SolutionExplorer);
        let options = CaptureOptions {
            timeout_ms: Some(20),
            ..CaptureOptions::default()
        };
        let outcome = rig
            .orchestrator
            .capture(&w, &options, &CancellationToken::new())
            .await
            .unwrap();

        let rejected = outcome.rejection().expect("rejected");
        assert_eq!(rejected.code, RejectionCode::Timeout);
        assert_eq!(rejected.stages.last(), Some(&CaptureStage::Rejected));

        for _ in 0..100 {
            if rig.desktop.open_device_contexts() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rig.desktop.open_device_contexts(), 0);
        assert_eq!(
            rig.desktop.device_contexts_acquired(),
            rig.desktop.device_contexts_released()
        );
    }

    #[tokio::test]
    async fn composite_reports_partial_failures() {
        let rig = rig(CaptureConfig::default());
        rig.desktop.fail_capture(WindowHandle(0x1003));
        let windows = vec![
            window(&rig.desktop, 0x1001, WindowType::Toolbox),
            window(&rig.desktop, 0x1002, WindowType::SolutionExplorer),
            window(&rig.desktop, 0x1003, WindowType::Properties),
        ];
        let outcome = rig
            .orchestrator
            .capture_composite(
                &windows,
                LayoutAnalysis::empty(),
                &CaptureOptions::annotated(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let composite = outcome.composite().expect("completed");
        let handles: Vec<_> = composite.windows.iter().map(|r| r.handle.unwrap().0).collect();
        assert_eq!(handles, vec![0x1001, 0x1002]);
        assert_eq!(composite.partial_failures.len(), 1);
        assert_eq!(composite.partial_failures[0].handle, WindowHandle(0x1003));
        assert_eq!(composite.partial_failures[0].code, RejectionCode::CaptureFailed);
        for result in &composite.windows {
            assert_eq!(
                result.stages,
                vec![
                    CaptureStage::Validated,
                    CaptureStage::MemoryAssessed,
                    CaptureStage::StrategySelected,
                    CaptureStage::Capturing,
                    CaptureStage::Annotated,
                    CaptureStage::Completed,
                ]
            );
        }

        let stitched = composite.stitched.as_ref().expect("stitched");
        // Toolbox at (0,80) and Solution Explorer at (1620,80,300,600).
        assert_eq!((stitched.width, stitched.height), (1920, 800));
        assert_eq!(stitched.annotations.len(), 2);
        assert_eq!(stitched.annotations[1].bounds, Rect::new(1620, 0, 300, 600));
        assert!(stitched.stages.contains(&CaptureStage::Stitching));
        assert_eq!(rig.desktop.open_device_contexts(), 0);
    }

    #[tokio::test]
    async fn composite_with_every_window_failing_is_rejected() {
        let rig = rig(CaptureConfig::default());
        rig.desktop.fail_capture(WindowHandle(0x1001));
        let windows = vec![window(&rig.desktop, 0x1001, WindowType::Toolbox)];
        let outcome = rig
            .orchestrator
            .capture_composite(
                &windows,
                LayoutAnalysis::empty(),
                &CaptureOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.rejection().unwrap().code, RejectionCode::AllWindowsFailed);
    }

    #[tokio::test]
    async fn cancelled_composite_releases_everything() {
        let rig = rig(CaptureConfig::default());
        rig.desktop.set_capture_delay(Duration::from_millis(100));
        let windows = vec![
            window(&rig.desktop, 0x1001, WindowType::Toolbox),
            window(&rig.desktop, 0x1002, WindowType::SolutionExplorer),
            window(&rig.desktop, 0x1003, WindowType::Properties),
        ];
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let outcome = rig
            .orchestrator
            .capture_composite(&windows, LayoutAnalysis::empty(), &CaptureOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.rejection().unwrap().code, RejectionCode::Cancelled);

        for _ in 0..100 {
            if rig.desktop.open_device_contexts() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rig.desktop.open_device_contexts(), 0);
        assert_eq!(
            rig.desktop.device_contexts_acquired(),
            rig.desktop.device_contexts_released()
        );
    }

    #[test]
    fn every_code_has_a_hint() {
        for code in [
            RejectionCode::ExceedsMaximumSafeLimit,
            RejectionCode::MemoryEmergency,
            RejectionCode::RequiresOptimization,
            RejectionCode::WindowNotFound,
            RejectionCode::Timeout,
            RejectionCode::Cancelled,
            RejectionCode::CaptureFailed,
            RejectionCode::AllWindowsFailed,
        ] {
            assert!(!hint_for(code).is_empty());
        }
    }
}
