//! Memory pressure report.

use std::sync::Arc;

use idelens_capture_engine::estimate_bytes;
use idelens_common::clock::SystemClock;
use idelens_memory_monitor::MemoryMonitor;
use idelens_platform_core::{MemoryProbe, Rect};
use idelens_platform_linux::ProcMemoryProbe;
use idelens_platform_windows::Win32Platform;
use serde::Serialize;

use super::{print_json, Env};

#[derive(Serialize)]
struct MemoryReport {
    snapshot: idelens_memory_monitor::MemorySnapshot,
    level: idelens_window_model::RiskLevel,
    hard_ceiling_bytes: u64,
    exceeds_ceiling: bool,
    assessment: idelens_window_model::MemoryAllocationAssessment,
}

fn probe(env: &Env) -> anyhow::Result<Arc<dyn MemoryProbe>> {
    if env.simulate {
        return Ok(env.platform()?.memory);
    }
    if cfg!(windows) {
        return Ok(Arc::new(Win32Platform::new()?));
    }
    Ok(Arc::new(ProcMemoryProbe::new()))
}

pub fn run(env: &Env, width: u32, height: u32) -> anyhow::Result<()> {
    let monitor = MemoryMonitor::new(probe(env)?, env.config.memory.clone(), SystemClock::shared());
    let snapshot = monitor.sample_now()?;

    let region = Rect::new(0, 0, width.min(i32::MAX as u32) as i32, height.min(i32::MAX as u32) as i32);
    let requested = estimate_bytes(&region, env.config.capture.bytes_per_pixel);
    let assessment = monitor.assess(requested, &format!("capture {width}x{height}"))?;

    print_json(&MemoryReport {
        snapshot,
        level: monitor.current_level(),
        hard_ceiling_bytes: env.config.capture.hard_ceiling_bytes,
        exceeds_ceiling: requested > env.config.capture.hard_ceiling_bytes,
        assessment,
    })
}
