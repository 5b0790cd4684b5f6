//! Docking and overlap analysis results.

use serde::{Deserialize, Serialize};

use idelens_platform_core::WindowHandle;

/// Side of the main window a pane is docked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl DockSide {
    /// Edge-check order; a window lands in the first side that matches.
    pub const CHECK_ORDER: [DockSide; 4] =
        [DockSide::Left, DockSide::Right, DockSide::Top, DockSide::Bottom];
}

/// Placement of one window relative to the main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Docked(DockSide),
    Floating,
}

/// Intersection of two windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowOverlap {
    pub first: WindowHandle,
    pub second: WindowHandle,
    /// Intersection area in pixels.
    pub area: i64,
    /// Intersection area as a percentage of the smaller window's area.
    pub percent_of_smaller: f64,
}

/// Docking and overlap relationships around the main window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutAnalysis {
    /// The main window; `None` for an empty analysis.
    pub main_window: Option<WindowHandle>,
    pub left: Vec<WindowHandle>,
    pub right: Vec<WindowHandle>,
    pub top: Vec<WindowHandle>,
    pub bottom: Vec<WindowHandle>,
    pub floating: Vec<WindowHandle>,
    pub overlaps: Vec<WindowOverlap>,
}

impl LayoutAnalysis {
    /// The analysis returned when no single main window exists.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.main_window.is_none()
    }

    /// Windows docked to `side`, in input order.
    pub fn docked(&self, side: DockSide) -> &[WindowHandle] {
        match side {
            DockSide::Left => &self.left,
            DockSide::Right => &self.right,
            DockSide::Top => &self.top,
            DockSide::Bottom => &self.bottom,
        }
    }

    /// Placement of `handle`, `None` if it is the main window or was not analyzed.
    pub fn placement_of(&self, handle: WindowHandle) -> Option<Placement> {
        for side in DockSide::CHECK_ORDER {
            if self.docked(side).contains(&handle) {
                return Some(Placement::Docked(side));
            }
        }
        self.floating
            .contains(&handle)
            .then_some(Placement::Floating)
    }

    /// Number of non-main windows placed.
    pub fn placed_count(&self) -> usize {
        self.left.len() + self.right.len() + self.top.len() + self.bottom.len() + self.floating.len()
    }
}
