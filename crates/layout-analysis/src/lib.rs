//! IdeLens Layout Analysis
//!
//! Derives docking sides and pairwise overlaps for a classified window set,
//! relative to the IDE's main window.

pub mod docking;
pub mod overlap;

pub use docking::dock_side;
pub use overlap::{detect_overlaps, overlap_between};

use idelens_common::config::LayoutConfig;
use idelens_window_model::{LayoutAnalysis, Placement, Window};

/// Computes [`LayoutAnalysis`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutAnalyzer {
    /// Maximum edge distance, in pixels, that still counts as aligned.
    pub tolerance: i32,
}

impl Default for LayoutAnalyzer {
    fn default() -> Self {
        Self::from_config(&LayoutConfig::default())
    }
}

impl LayoutAnalyzer {
    pub fn new(tolerance: i32) -> Self {
        Self {
            tolerance: tolerance.max(0),
        }
    }

    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::new(config.dock_tolerance_px)
    }

    /// Analyze `windows` around their single main window.
    ///
    /// Without exactly one window classified as the main window the result
    /// is empty. Docked and floating lists keep input order. Overlaps cover
    /// every unordered pair of windows, the main window included.
    pub fn analyze(&self, windows: &[Window]) -> LayoutAnalysis {
        let mut mains = windows.iter().filter(|w| w.is_main());
        let (main, extra) = (mains.next(), mains.next());
        let main = match (main, extra) {
            (Some(main), None) => main,
            (None, _) => {
                tracing::warn!(windows = windows.len(), "No main window found, layout is empty");
                return LayoutAnalysis::empty();
            }
            (Some(_), Some(_)) => {
                tracing::warn!(
                    windows = windows.len(),
                    "More than one main window found, layout is empty"
                );
                return LayoutAnalysis::empty();
            }
        };

        let mut layout = LayoutAnalysis {
            main_window: Some(main.handle),
            ..LayoutAnalysis::default()
        };
        let others: Vec<&Window> = windows.iter().filter(|w| !w.is_main()).collect();

        for window in &others {
            match dock_side(&main.rect, &window.rect, self.tolerance) {
                Placement::Docked(side) => {
                    use idelens_window_model::DockSide::*;
                    match side {
                        Left => layout.left.push(window.handle),
                        Right => layout.right.push(window.handle),
                        Top => layout.top.push(window.handle),
                        Bottom => layout.bottom.push(window.handle),
                    }
                }
                Placement::Floating => layout.floating.push(window.handle),
            }
        }

        layout.overlaps = detect_overlaps(windows.iter().map(|w| (w.handle, w.rect)));
        tracing::debug!(
            main = %main.handle,
            docked = layout.placed_count() - layout.floating.len(),
            floating = layout.floating.len(),
            overlaps = layout.overlaps.len(),
            "Layout analyzed"
        );
        layout
    }
}
