//! Capture one window.

use std::path::PathBuf;

use idelens_platform_core::{Rect, WindowHandle};
use idelens_window_model::{CaptureOptions, CaptureOutcome};

use super::{cancel_on_ctrl_c, print_json, Env};

/// Parse `x,y,width,height`.
pub fn parse_region(value: &str) -> Result<Rect, String> {
    let parts: Vec<i32> = value
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid region {value:?}: {e}"))?;
    match parts.as_slice() {
        [x, y, width, height] if *width > 0 && *height > 0 => Ok(Rect::new(*x, *y, *width, *height)),
        [_, _, _, _] => Err(format!("region {value:?} must have a positive size")),
        _ => Err(format!("region {value:?} must be x,y,width,height")),
    }
}

pub async fn run(
    env: &Env,
    handle: WindowHandle,
    region: Option<Rect>,
    annotate: bool,
    timeout_ms: Option<u64>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let engine = env.engine()?;
    let options = CaptureOptions {
        region,
        annotate,
        timeout_ms,
    };
    let outcome = engine
        .capture_window(handle, &options, &cancel_on_ctrl_c())
        .await?;
    engine.shutdown().await?;

    match outcome {
        CaptureOutcome::Captured(result) => {
            if let Some(path) = &output {
                std::fs::write(path, &result.image)?;
                eprintln!("Wrote {} ({} bytes)", path.display(), result.encoded_len);
            }
            print_json(&result)
        }
        CaptureOutcome::Rejected(rejection) => {
            print_json(&rejection)?;
            anyhow::bail!("capture rejected: {} ({})", rejection.code, rejection.hint)
        }
    }
}
