//! Capture requests, results, and structured rejections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idelens_platform_core::{Rect, WindowHandle};

use crate::layout::LayoutAnalysis;
use crate::memory::MemoryAllocationAssessment;
use crate::window::WindowType;

/// Caller-supplied capture options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Sub-region in window coordinates. The whole window when unset.
    pub region: Option<Rect>,
    /// Emit per-element annotations.
    pub annotate: bool,
    /// Overrides the configured single-window timeout (milliseconds).
    pub timeout_ms: Option<u64>,
}

impl CaptureOptions {
    pub fn region(region: Rect) -> Self {
        Self {
            region: Some(region),
            ..Self::default()
        }
    }

    pub fn annotated() -> Self {
        Self {
            annotate: true,
            ..Self::default()
        }
    }
}

/// Stages of the per-request state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStage {
    Validated,
    MemoryAssessed,
    StrategySelected,
    Capturing,
    Stitching,
    Annotated,
    Completed,
    Rejected,
}

/// One labelled region of a captured image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub element: WindowType,
    /// Bounds in image coordinates.
    pub bounds: Rect,
    pub label: String,
}

/// A captured, encoded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    /// The captured window; `None` for a stitched composite.
    pub handle: Option<WindowHandle>,
    pub window_type: WindowType,
    /// PNG bytes. Not part of the serialized form.
    #[serde(skip)]
    pub image: Vec<u8>,
    pub encoded_len: usize,
    pub width: u32,
    pub height: u32,
    /// Output scale relative to the captured pixels (1.0 = full resolution).
    pub scale: f32,
    pub captured_at: DateTime<Utc>,
    pub annotations: Vec<Annotation>,
    /// Advice carried over from a `Warning` memory assessment.
    pub guidance: Option<String>,
    pub stages: Vec<CaptureStage>,
}

/// Machine-readable rejection reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCode {
    /// The estimated size is beyond the absolute ceiling.
    ExceedsMaximumSafeLimit,
    /// The memory assessment rejected the allocation.
    MemoryEmergency,
    /// Still critical after a forced cleanup pass.
    RequiresOptimization,
    /// The window is gone or not part of the target application.
    WindowNotFound,
    Timeout,
    Cancelled,
    /// The native primitive returned no pixels.
    CaptureFailed,
    /// Every window of a composite request failed.
    AllWindowsFailed,
}

impl RejectionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionCode::ExceedsMaximumSafeLimit => "exceeds maximum safe limit",
            RejectionCode::MemoryEmergency => "memory emergency",
            RejectionCode::RequiresOptimization => "requires optimization",
            RejectionCode::WindowNotFound => "window not found",
            RejectionCode::Timeout => "timeout",
            RejectionCode::Cancelled => "cancelled",
            RejectionCode::CaptureFailed => "capture failed",
            RejectionCode::AllWindowsFailed => "all windows failed",
        }
    }
}

impl std::fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capture request that was refused or could not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRejection {
    pub code: RejectionCode,
    pub message: String,
    /// What the caller can do about it.
    pub hint: String,
    pub assessment: Option<MemoryAllocationAssessment>,
    pub stages: Vec<CaptureStage>,
}

/// Result of a single-window capture.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Captured(CaptureResult),
    Rejected(CaptureRejection),
}

impl CaptureOutcome {
    pub fn is_captured(&self) -> bool {
        matches!(self, CaptureOutcome::Captured(_))
    }

    pub fn rejection(&self) -> Option<&CaptureRejection> {
        match self {
            CaptureOutcome::Rejected(r) => Some(r),
            CaptureOutcome::Captured(_) => None,
        }
    }

    pub fn result(&self) -> Option<&CaptureResult> {
        match self {
            CaptureOutcome::Captured(r) => Some(r),
            CaptureOutcome::Rejected(_) => None,
        }
    }
}

/// A window that dropped out of a composite capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialFailure {
    pub handle: WindowHandle,
    pub code: RejectionCode,
    pub message: String,
}

/// Result of a multi-window capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeCapture {
    /// Per-window captures, in request order, failed windows omitted.
    pub windows: Vec<CaptureResult>,
    /// All successful captures stitched onto one canvas.
    pub stitched: Option<CaptureResult>,
    pub layout: LayoutAnalysis,
    pub partial_failures: Vec<PartialFailure>,
}

/// Result of a multi-window capture request.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeOutcome {
    Completed(CompositeCapture),
    Rejected(CaptureRejection),
}

impl CompositeOutcome {
    pub fn rejection(&self) -> Option<&CaptureRejection> {
        match self {
            CompositeOutcome::Rejected(r) => Some(r),
            CompositeOutcome::Completed(_) => None,
        }
    }

    pub fn composite(&self) -> Option<&CompositeCapture> {
        match self {
            CompositeOutcome::Completed(c) => Some(c),
            CompositeOutcome::Rejected(_) => None,
        }
    }
}
