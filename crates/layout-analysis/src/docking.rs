//! Edge-alignment docking detection.

use idelens_platform_core::Rect;
use idelens_window_model::{DockSide, Placement};

/// Placement of `window` relative to `main`.
///
/// A side matches when the window's edge on that side is within `tolerance`
/// pixels of the main window's edge and the window's span on the other axis
/// lies inside the main window's span. Sides are tried in
/// [`DockSide::CHECK_ORDER`]; the first match wins.
pub fn dock_side(main: &Rect, window: &Rect, tolerance: i32) -> Placement {
    DockSide::CHECK_ORDER
        .into_iter()
        .find(|side| docks_on(main, window, *side, tolerance))
        .map_or(Placement::Floating, Placement::Docked)
}

fn docks_on(main: &Rect, window: &Rect, side: DockSide, tolerance: i32) -> bool {
    let within = |a: i32, b: i32| (a as i64 - b as i64).abs() <= tolerance as i64;
    let vertical_inside = window.y >= main.y && window.bottom() <= main.bottom();
    let horizontal_inside = window.x >= main.x && window.right() <= main.right();
    match side {
        DockSide::Left => within(window.x, main.x) && vertical_inside,
        DockSide::Right => within(window.right(), main.right()) && vertical_inside,
        DockSide::Top => within(window.y, main.y) && horizontal_inside,
        DockSide::Bottom => within(window.bottom(), main.bottom()) && horizontal_inside,
    }
}
