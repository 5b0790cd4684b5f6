//! IdeLens Resource Lifecycle
//!
//! Owns the acquisition and release of every native handle, pooled object,
//! and time-bounded lease the engine touches.
//!
//! # Guarantees
//!
//! - Every acquisition is recorded in an ordered registry.
//! - Every release action runs exactly once: explicitly, through a
//!   [`LeaseScope`] on exit (including unwinding), through the expiry sweep,
//!   through idle cleanup under memory pressure, or when the manager is dropped.
//! - Batch releases walk the registry in reverse acquisition order.
//! - A failing release action never stops the rest of a batch; failures are
//!   collected into [`ReleaseErrors`] and reported at the end of the pass.

pub mod manager;
pub mod pool;
pub mod scope;
pub mod sweeper;

pub use manager::*;
pub use scope::LeaseScope;
pub use sweeper::SweeperHandle;
