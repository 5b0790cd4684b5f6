//! List and classify the target application's windows.

use std::time::Duration;

use super::{cancel_on_ctrl_c, print_json, Env};

pub async fn run(env: &Env, timeout_ms: Option<u64>) -> anyhow::Result<()> {
    let engine = env.engine()?;
    let scan = engine
        .discover_windows(timeout_ms.map(Duration::from_millis), &cancel_on_ctrl_c())
        .await?;
    if scan.timed_out {
        eprintln!("Discovery timed out; the list is partial.");
    }
    print_json(&scan)?;
    engine.shutdown().await?;
    Ok(())
}
