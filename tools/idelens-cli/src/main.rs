//! IdeLens CLI: discover, classify, analyze, and capture IDE windows.
//!
//! Usage:
//!   idelens discover                 List and classify the IDE's windows
//!   idelens layout                   Show docking and overlaps around the main window
//!   idelens capture <HANDLE>         Capture one window to PNG
//!   idelens composite <HANDLE>...    Capture several windows and stitch them
//!   idelens memory                   Show memory pressure and assess an allocation
//!   idelens check                    Check system capabilities
//!
//! Every command except `check` prints JSON. `--simulate` runs against a
//! built-in IDE session.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use idelens_platform_core::WindowHandle;

mod commands;

#[derive(Parser)]
#[command(
    name = "idelens",
    about = "Memory-aware capture and classification of IDE windows",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run against a simulated IDE session instead of the desktop
    #[arg(long, global = true)]
    simulate: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List and classify the target application's windows
    Discover {
        /// Scan timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Analyze docking and overlaps of the discovered windows
    Layout {
        /// Scan timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Capture one window
    Capture {
        /// Window handle, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_handle)]
        handle: WindowHandle,

        /// Region as x,y,width,height in window coordinates
        #[arg(long, value_parser = commands::capture::parse_region)]
        region: Option<idelens_platform_core::Rect>,

        /// Emit annotations
        #[arg(long)]
        annotate: bool,

        /// Capture timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Write the PNG here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Capture several windows and stitch them onto one canvas
    Composite {
        /// Window handles, decimal or 0x-prefixed hex
        #[arg(required = true, value_parser = parse_handle)]
        handles: Vec<WindowHandle>,

        /// Emit annotations
        #[arg(long)]
        annotate: bool,

        /// Per-window timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Write the stitched PNG here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sample memory and assess a prospective capture
    Memory {
        /// Width of the capture to assess
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Height of the capture to assess
        #[arg(long, default_value = "1080")]
        height: u32,
    },

    /// Check system capabilities
    Check,
}

fn parse_handle(value: &str) -> Result<WindowHandle, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    match parsed {
        Ok(0) => Err("window handle must not be null".to_string()),
        Ok(raw) => Ok(WindowHandle(raw)),
        Err(e) => Err(format!("invalid window handle {value:?}: {e}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => idelens_common::config::EngineConfig::load_from(path)?,
        None => idelens_common::config::EngineConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    idelens_common::logging::init_logging(&config.logging)?;

    let env = commands::Env {
        config,
        simulate: cli.simulate,
    };

    match cli.command {
        Commands::Discover { timeout_ms } => commands::discover::run(&env, timeout_ms).await,
        Commands::Layout { timeout_ms } => commands::layout::run(&env, timeout_ms).await,
        Commands::Capture {
            handle,
            region,
            annotate,
            timeout_ms,
            output,
        } => commands::capture::run(&env, handle, region, annotate, timeout_ms, output).await,
        Commands::Composite {
            handles,
            annotate,
            timeout_ms,
            output,
        } => commands::composite::run(&env, handles, annotate, timeout_ms, output).await,
        Commands::Memory { width, height } => commands::memory::run(&env, width, height),
        Commands::Check => commands::check::run(),
    }
}
