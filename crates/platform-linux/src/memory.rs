//! Memory sampling from procfs.

use std::path::PathBuf;

use idelens_common::error::{IdelensError, IdelensResult};
use idelens_platform_core::{MemoryProbe, MemorySample};

/// Reads `/proc/self/status` and `/proc/meminfo`.
#[derive(Debug, Clone)]
pub struct ProcMemoryProbe {
    proc_root: PathBuf,
}

impl ProcMemoryProbe {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Probe rooted at an alternate procfs mount.
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl Default for ProcMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn sample(&self) -> IdelensResult<MemorySample> {
        let status = std::fs::read_to_string(self.proc_root.join("self").join("status"))?;
        let meminfo = std::fs::read_to_string(self.proc_root.join("meminfo"))?;

        let process_bytes = kib_field(&status, "VmRSS:").ok_or_else(|| {
            IdelensError::platform("VmRSS missing from /proc/self/status")
        })?;
        let total_bytes = kib_field(&meminfo, "MemTotal:")
            .ok_or_else(|| IdelensError::platform("MemTotal missing from /proc/meminfo"))?;
        // Kernels before 3.14 lack MemAvailable.
        let available_bytes = kib_field(&meminfo, "MemAvailable:")
            .or_else(|| {
                let free = kib_field(&meminfo, "MemFree:")?;
                let cached = kib_field(&meminfo, "Cached:").unwrap_or(0);
                Some(free + cached)
            })
            .unwrap_or(0);

        tracing::trace!(process_bytes, available_bytes, total_bytes, "Sampled procfs memory");
        Ok(MemorySample {
            process_bytes,
            available_bytes,
            total_bytes,
            collections: None,
        })
    }
}

/// Parse a `Key:   1234 kB` line and return the value in bytes.
pub fn kib_field(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line[key.len()..].split_whitespace().next())
        .and_then(|value| value.parse::<u64>().ok())
        .map(|kib| kib * 1024)
}
