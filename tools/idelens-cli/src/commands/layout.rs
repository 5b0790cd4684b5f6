//! Docking and overlap analysis of the discovered windows.

use std::time::Duration;

use super::{cancel_on_ctrl_c, print_json, Env};

pub async fn run(env: &Env, timeout_ms: Option<u64>) -> anyhow::Result<()> {
    let engine = env.engine()?;
    let scan = engine
        .discover_windows(timeout_ms.map(Duration::from_millis), &cancel_on_ctrl_c())
        .await?;
    let layout = engine.analyze_layout(&scan.typed_windows());
    if layout.is_empty() {
        eprintln!("No single main window was found; nothing to analyze.");
    }
    print_json(&layout)?;
    engine.shutdown().await?;
    Ok(())
}
