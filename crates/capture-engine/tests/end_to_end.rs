use std::sync::Arc;
use std::time::Duration;

use idelens_capture_engine::{Platform, VisionEngine};
use idelens_common::clock::ManualClock;
use idelens_common::config::EngineConfig;
use idelens_platform_core::simulated::SimulatedDesktop;
use idelens_platform_core::{ProcessId, Rect, WindowHandle};
use idelens_window_model::{CaptureOptions, DockSide, RejectionCode, RiskLevel, WindowType};
use tokio_util::sync::CancellationToken;

const MIB: u64 = 1024 * 1024;

struct Harness {
    desktop: Arc<SimulatedDesktop>,
    clock: Arc<ManualClock>,
    engine: VisionEngine,
}

fn harness() -> Harness {
    let desktop = Arc::new(SimulatedDesktop::ide_session());
    let clock = ManualClock::shared();
    let engine = VisionEngine::new(
        EngineConfig::default(),
        Platform::simulated(desktop.clone()),
        clock.clone(),
    )
    .expect("engine should assemble");
    Harness {
        desktop,
        clock,
        engine,
    }
}

async fn wait_for_released(desktop: &SimulatedDesktop) {
    for _ in 0..200 {
        if desktop.open_device_contexts() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn oversized_region_is_rejected_without_native_calls() {
    let h = harness();
    let outcome = h
        .engine
        .capture_window(
            WindowHandle(0x1000),
            &CaptureOptions::region(Rect::new(0, 0, 8000, 8000)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let rejected = outcome.rejection().expect("oversized capture must be rejected");
    assert_eq!(rejected.code, RejectionCode::ExceedsMaximumSafeLimit);
    assert_eq!(rejected.code.to_string(), "exceeds maximum safe limit");
    assert!(!rejected.hint.is_empty());
    assert_eq!(h.desktop.capture_calls(), 0);
    assert_eq!(h.desktop.device_contexts_acquired(), 0);
}

#[tokio::test]
async fn access_denied_process_windows_are_excluded() {
    let h = harness();
    let scan = h
        .engine
        .discover_windows(None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(scan
        .windows
        .iter()
        .all(|c| c.window.process_id != ProcessId(4) && c.window.handle != WindowHandle(0x2000)));
    assert!(scan.skipped.access_denied >= 1);
    assert!(scan
        .windows
        .iter()
        .any(|c| c.window.window_type == WindowType::MainWindow));

    // Capturing the denied window reads as "not found", not as an error.
    let outcome = h
        .engine
        .capture_window(WindowHandle(0x2000), &CaptureOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.rejection().unwrap().code, RejectionCode::WindowNotFound);
}

#[tokio::test]
async fn every_device_context_is_released_exactly_once() {
    let h = harness();
    let cancel = CancellationToken::new();

    let ok = h
        .engine
        .capture_window(WindowHandle(0x1002), &CaptureOptions::annotated(), &cancel)
        .await
        .unwrap();
    assert!(ok.is_captured());

    h.desktop.fail_capture(WindowHandle(0x1003));
    let failed = h
        .engine
        .capture_window(WindowHandle(0x1003), &CaptureOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(failed.rejection().unwrap().code, RejectionCode::CaptureFailed);

    let composite = h
        .engine
        .capture_composite(
            &[WindowHandle(0x1000), WindowHandle(0x1001), WindowHandle(0x1003), WindowHandle(0x1004)],
            &CaptureOptions::annotated(),
            &cancel,
        )
        .await
        .unwrap();
    let composite = composite.composite().expect("composite completes with partial failures");
    assert_eq!(composite.windows.len(), 3);
    assert_eq!(composite.partial_failures.len(), 1);

    h.desktop.set_capture_delay(Duration::from_millis(150));
    let timed_out = h
        .engine
        .capture_window(
            WindowHandle(0x1004),
            &CaptureOptions {
                timeout_ms: Some(10),
                ..CaptureOptions::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(timed_out.rejection().unwrap().code, RejectionCode::Timeout);

    wait_for_released(&h.desktop).await;
    assert_eq!(h.desktop.open_device_contexts(), 0);
    assert_eq!(
        h.desktop.device_contexts_acquired(),
        h.desktop.device_contexts_released()
    );
    assert_eq!(h.desktop.device_contexts_acquired(), 1 + 1 + 4 + 1);

    let stats = h.engine.shutdown().await.unwrap();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn classification_is_cached_until_the_ttl_lapses() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.engine.discover_windows(None, &cancel).await.unwrap();
    let first = h.engine.classifier().evaluations();
    assert!(first > 0);

    h.engine.discover_windows(None, &cancel).await.unwrap();
    assert_eq!(h.engine.classifier().evaluations(), first);

    h.clock.advance(Duration::from_secs(301));
    h.engine.discover_windows(None, &cancel).await.unwrap();
    assert_eq!(h.engine.classifier().evaluations(), first * 2);
}

#[tokio::test]
async fn discovered_layout_matches_the_ide_arrangement() {
    let h = harness();
    let scan = h
        .engine
        .discover_windows(None, &CancellationToken::new())
        .await
        .unwrap();
    let layout = h.engine.analyze_layout(&scan.typed_windows());

    assert_eq!(layout.main_window, Some(WindowHandle(0x1000)));
    assert!(layout.docked(DockSide::Left).contains(&WindowHandle(0x1001)));
    assert!(layout.docked(DockSide::Right).contains(&WindowHandle(0x1002)));
    assert!(layout.docked(DockSide::Bottom).contains(&WindowHandle(0x1004)));
    // The editor surface sits entirely inside the editor pane.
    assert!(layout.overlaps.iter().any(|o| {
        (o.first, o.second) == (WindowHandle(0x1005), WindowHandle(0x1006))
            && (o.percent_of_smaller - 100.0).abs() < 1e-9
    }));
}

#[tokio::test]
async fn high_pressure_releases_pooled_objects() {
    let h = harness();
    let lifecycle = h.engine.lifecycle();
    lifecycle.return_to_pool("scratch", vec![0u8; 64]);
    assert_eq!(lifecycle.stats().pooled, 1);

    h.desktop.set_process_memory(1100 * MIB);
    h.engine.memory().sample_now().unwrap();
    assert_eq!(h.engine.memory().current_level(), RiskLevel::Critical);
    assert_eq!(lifecycle.stats().pooled, 0);
}

#[tokio::test]
async fn cancelled_discovery_returns_partial_results() {
    let h = harness();
    h.desktop.set_describe_delay(Duration::from_millis(100));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let scan = h.engine.discover_windows(None, &cancel).await.unwrap();
    assert!(scan.cancelled);
    assert!(!scan.timed_out);
}
