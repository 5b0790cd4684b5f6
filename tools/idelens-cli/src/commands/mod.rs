//! Subcommand implementations and the shared engine setup.

use std::sync::Arc;

use anyhow::Context;
use idelens_capture_engine::{Platform, VisionEngine};
use idelens_common::clock::SystemClock;
use idelens_common::config::EngineConfig;
use idelens_platform_core::simulated::SimulatedDesktop;
use idelens_platform_windows::Win32Platform;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub mod capture;
pub mod check;
pub mod composite;
pub mod discover;
pub mod layout;
pub mod memory;

/// Settings shared by every subcommand.
pub struct Env {
    pub config: EngineConfig,
    pub simulate: bool,
}

impl Env {
    pub fn platform(&self) -> anyhow::Result<Platform> {
        if self.simulate {
            tracing::info!("Using the simulated IDE session");
            return Ok(Platform::simulated(Arc::new(SimulatedDesktop::ide_session())));
        }
        let native = Arc::new(
            Win32Platform::new().context("pass --simulate to use the simulated IDE session")?,
        );
        Ok(Platform {
            windows: native.clone(),
            processes: native.clone(),
            capture: native.clone(),
            memory: native,
        })
    }

    pub fn engine(&self) -> anyhow::Result<VisionEngine> {
        let engine = VisionEngine::new(self.config.clone(), self.platform()?, SystemClock::shared())?;
        Ok(engine)
    }
}

/// A token cancelled on Ctrl+C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
