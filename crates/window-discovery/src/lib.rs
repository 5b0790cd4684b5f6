//! IdeLens Window Discovery
//!
//! Walks the native window tree and keeps only windows whose owning process
//! is the target IDE, is accessible, and is responding.
//!
//! - The tree walk runs on a blocking worker; callback-style native APIs
//!   never run on the async executor.
//! - Owning processes are validated concurrently under a shared limiter.
//! - A scan is bounded by one timeout and one cancellation token. Either
//!   ends the scan early with whatever was validated so far.
//! - A failure for one window never aborts the scan; it is counted and
//!   logged by category.

pub mod enumerator;
pub mod validation;
mod walk;

pub use enumerator::{Discovery, SkipCounts, WindowEnumerator};
pub use validation::{is_target_process, validate_owner};
