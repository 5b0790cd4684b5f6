//! IdeLens Linux Platform Integration
//!
//! Platform-specific implementations for Linux:
//! - **Memory:** process resident set and system availability from procfs
//! - **Processes:** name and liveness of a PID from procfs
//! - **Capabilities:** what the engine can and cannot do on this host
//!
//! Linux has no window tree the target IDE lives in, so window enumeration
//! and capture are not provided here.

pub mod memory;
pub mod permissions;
pub mod process;

pub use memory::ProcMemoryProbe;
pub use permissions::check_capabilities;
pub use process::ProcfsProcessResolver;
