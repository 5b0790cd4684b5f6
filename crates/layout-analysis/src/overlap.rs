//! Pairwise overlap detection.

use idelens_platform_core::{Rect, WindowHandle};
use idelens_window_model::WindowOverlap;

/// Overlap of two windows, `None` when their intersection is empty.
pub fn overlap_between(
    first: (WindowHandle, Rect),
    second: (WindowHandle, Rect),
) -> Option<WindowOverlap> {
    let intersection = first.1.intersection(&second.1)?;
    let area = intersection.area();
    if area <= 0 {
        return None;
    }
    let smaller = first.1.area().min(second.1.area());
    let percent_of_smaller = if smaller > 0 {
        area as f64 / smaller as f64 * 100.0
    } else {
        0.0
    };
    Some(WindowOverlap {
        first: first.0,
        second: second.0,
        area,
        percent_of_smaller,
    })
}

/// Every overlapping unordered pair, in input order (`i < j`).
pub fn detect_overlaps(windows: impl IntoIterator<Item = (WindowHandle, Rect)>) -> Vec<WindowOverlap> {
    let windows: Vec<(WindowHandle, Rect)> = windows.into_iter().collect();
    let mut overlaps = Vec::new();
    for (i, a) in windows.iter().enumerate() {
        for b in &windows[i + 1..] {
            if let Some(overlap) = overlap_between(*a, *b) {
                overlaps.push(overlap);
            }
        }
    }
    overlaps
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn h(n: u64) -> WindowHandle {
        WindowHandle(n)
    }

    #[test]
    fn contained_window_overlaps_fully() {
        let overlap = overlap_between(
            (h(1), Rect::new(300, 80, 1320, 800)),
            (h(2), Rect::new(340, 110, 1280, 770)),
        )
        .unwrap();
        assert_eq!(overlap.area, 1280 * 770);
        assert!((overlap.percent_of_smaller - 100.0).abs() < 1e-9);
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        assert!(overlap_between(
            (h(1), Rect::new(0, 0, 100, 100)),
            (h(2), Rect::new(100, 0, 100, 100))
        )
        .is_none());
    }

    #[test]
    fn every_pair_is_reported_once() {
        let overlaps = detect_overlaps([
            (h(1), Rect::new(0, 0, 100, 100)),
            (h(2), Rect::new(50, 50, 100, 100)),
            (h(3), Rect::new(75, 75, 10, 10)),
        ]);
        let pairs: Vec<_> = overlaps.iter().map(|o| (o.first.0, o.second.0)).collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
        assert!((overlaps[0].percent_of_smaller - 25.0).abs() < 1e-9);
    }

    fn rect() -> impl Strategy<Value = Rect> {
        (-500i32..2500, -500i32..1500, 1i32..1500, 1i32..1000)
            .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn disjoint_rects_never_overlap(a in rect(), gap in 0i32..200, w in 1i32..500, h in 1i32..500, y in -500i32..1500) {
            let b = Rect::new(a.right() + gap, y, w, h);
            prop_assert!(detect_overlaps([(WindowHandle(1), a), (WindowHandle(2), b)]).is_empty());
        }

        #[test]
        fn identical_rects_overlap_completely(a in rect()) {
            let overlaps = detect_overlaps([(WindowHandle(1), a), (WindowHandle(2), a)]);
            prop_assert_eq!(overlaps.len(), 1);
            prop_assert_eq!(overlaps[0].area, a.area());
            prop_assert!((overlaps[0].percent_of_smaller - 100.0).abs() < 1e-9);
        }

        #[test]
        fn overlap_is_symmetric_and_bounded(a in rect(), b in rect()) {
            let ab = overlap_between((WindowHandle(1), a), (WindowHandle(2), b));
            let ba = overlap_between((WindowHandle(2), b), (WindowHandle(1), a));
            prop_assert_eq!(ab.as_ref().map(|o| o.area), ba.as_ref().map(|o| o.area));
            if let Some(o) = ab {
                prop_assert!(o.area > 0);
                prop_assert!(o.area <= a.area().min(b.area()));
                prop_assert!(o.percent_of_smaller > 0.0 && o.percent_of_smaller <= 100.0);
            }
        }
    }
}
