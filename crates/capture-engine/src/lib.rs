//! IdeLens Capture Engine
//!
//! Turns validated, classified windows into encoded images while staying
//! inside the process's memory and handle budgets, and hosts the
//! [`VisionEngine`] that wires every stage together.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      VisionEngine                        │
//! │  ┌────────────┐   ┌────────────┐   ┌─────────────────┐   │
//! │  │ Enumerator │──▶│ Classifier │──▶│ Layout Analyzer │   │
//! │  └────────────┘   └────────────┘   └────────┬────────┘   │
//! │                                             ▼            │
//! │  ┌────────────────┐   ┌──────────────────────────────┐   │
//! │  │ Memory Monitor │◀──│     CaptureOrchestrator      │   │
//! │  └───────┬────────┘   │ ceiling ▸ assess ▸ strategy  │   │
//! │          │ pressure   │ ▸ capture ▸ stitch ▸ encode  │   │
//! │          ▼            └──────────────┬───────────────┘   │
//! │  ┌──────────────────────────────────────────────────┐    │
//! │  │     Resource Manager (leases, scopes, pools)     │    │
//! │  └──────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod encode;
pub mod engine;
pub mod orchestrator;
pub mod strategy;

pub use engine::{Platform, VisionEngine, WindowScan};
pub use orchestrator::{hint_for, CaptureOrchestrator};
pub use strategy::{estimate_bytes, CaptureStrategy};
