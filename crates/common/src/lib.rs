//! IdeLens Common Utilities
//!
//! Shared infrastructure for all IdeLens crates:
//! - Error types and result aliases
//! - Clock abstraction for TTLs, lease ages, and timestamps
//! - Tracing/logging initialization
//! - Configuration loading
//! - Concurrency limiter sizing

pub mod clock;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use concurrency::*;
pub use config::*;
pub use error::*;
