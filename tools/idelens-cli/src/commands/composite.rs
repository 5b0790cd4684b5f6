//! Capture several windows and stitch them.

use std::path::PathBuf;

use idelens_platform_core::WindowHandle;
use idelens_window_model::{CaptureOptions, CompositeOutcome};

use super::{cancel_on_ctrl_c, print_json, Env};

pub async fn run(
    env: &Env,
    handles: Vec<WindowHandle>,
    annotate: bool,
    timeout_ms: Option<u64>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let engine = env.engine()?;
    let options = CaptureOptions {
        region: None,
        annotate,
        timeout_ms,
    };
    let outcome = engine
        .capture_composite(&handles, &options, &cancel_on_ctrl_c())
        .await?;
    engine.shutdown().await?;

    match outcome {
        CompositeOutcome::Completed(composite) => {
            for failure in &composite.partial_failures {
                eprintln!("Skipped {}: {} ({})", failure.handle, failure.code, failure.message);
            }
            if let (Some(path), Some(stitched)) = (&output, &composite.stitched) {
                std::fs::write(path, &stitched.image)?;
                eprintln!("Wrote {} ({} bytes)", path.display(), stitched.encoded_len);
            }
            print_json(&composite)
        }
        CompositeOutcome::Rejected(rejection) => {
            print_json(&rejection)?;
            anyhow::bail!("composite capture rejected: {} ({})", rejection.code, rejection.hint)
        }
    }
}
