//! IdeLens Memory Monitor
//!
//! Samples process and system memory on a fixed interval, keeps a rolling
//! history, and judges prospective allocations against projected usage.
//! Subscribers are told when the pressure level changes, not on every
//! sample.

pub mod assessment;
pub mod monitor;
pub mod sampler;

pub use assessment::{assess_sample, derive_level, is_rapid_growth, MemorySnapshot};
pub use monitor::{MemoryMonitor, PressureListener, SubscriptionId};
pub use sampler::SamplerHandle;
