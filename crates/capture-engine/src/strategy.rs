//! Per-window-type capture procedures.

use std::time::Duration;

use idelens_common::error::{IdelensError, IdelensResult};
use idelens_platform_core::Rect;
use idelens_window_model::{Window, WindowType};
use serde::{Deserialize, Serialize};

/// How one window type is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStrategy {
    /// The IDE frame including every hosted pane.
    Frame,
    /// Editors and designers; content repaints slowly after scrolling.
    Document,
    ToolPane,
    Dialog,
    Generic,
}

impl CaptureStrategy {
    pub fn for_type(window_type: WindowType) -> Self {
        match window_type {
            WindowType::MainWindow => CaptureStrategy::Frame,
            t if t.is_document() => CaptureStrategy::Document,
            t if t.is_tool_pane() => CaptureStrategy::ToolPane,
            WindowType::Dialog => CaptureStrategy::Dialog,
            _ => CaptureStrategy::Generic,
        }
    }

    /// Multiplier applied to the configured single-window timeout.
    pub fn timeout_factor(&self) -> u32 {
        match self {
            CaptureStrategy::Frame => 2,
            CaptureStrategy::Document => 2,
            CaptureStrategy::ToolPane | CaptureStrategy::Dialog | CaptureStrategy::Generic => 1,
        }
    }

    pub fn timeout(&self, base: Duration) -> Duration {
        base.saturating_mul(self.timeout_factor())
    }

    /// The rectangle to capture, in window coordinates.
    ///
    /// A requested region is taken as given; only its size is checked here.
    /// Without one the whole window is captured.
    pub fn region(&self, window: &Window, requested: Option<Rect>) -> IdelensResult<Rect> {
        let region = requested.unwrap_or(Rect::new(0, 0, window.rect.width, window.rect.height));
        if region.width <= 0 || region.height <= 0 {
            return Err(IdelensError::invalid_argument(format!(
                "capture region {}x{} for window {} is empty",
                region.width, region.height, window.handle
            )));
        }
        Ok(region)
    }

    /// Annotation label for a captured window.
    pub fn label(&self, window: &Window) -> String {
        let title = window.title.trim();
        if title.is_empty() {
            window.window_type.label().to_string()
        } else {
            format!("{}: {title}", window.window_type.label())
        }
    }
}

/// Bytes needed to hold `region` at `bytes_per_pixel`.
pub fn estimate_bytes(region: &Rect, bytes_per_pixel: u64) -> u64 {
    (region.area().max(0) as u64).saturating_mul(bytes_per_pixel)
}
