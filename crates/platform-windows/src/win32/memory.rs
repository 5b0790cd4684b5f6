//! Process working set and system memory status.

use idelens_common::error::{IdelensError, IdelensResult};
use idelens_platform_core::MemorySample;
use windows::Win32::System::ProcessStatus::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS};
use windows::Win32::System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX};
use windows::Win32::System::Threading::GetCurrentProcess;

pub fn sample() -> IdelensResult<MemorySample> {
    let mut counters = PROCESS_MEMORY_COUNTERS::default();
    // SAFETY: counters is a correctly sized out structure.
    unsafe {
        GetProcessMemoryInfo(
            GetCurrentProcess(),
            &mut counters,
            std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32,
        )
    }
    .map_err(|e| IdelensError::platform(format!("GetProcessMemoryInfo failed: {e}")))?;

    let mut status = MEMORYSTATUSEX {
        dwLength: std::mem::size_of::<MEMORYSTATUSEX>() as u32,
        ..Default::default()
    };
    // SAFETY: dwLength is initialised as the API requires.
    unsafe { GlobalMemoryStatusEx(&mut status) }
        .map_err(|e| IdelensError::platform(format!("GlobalMemoryStatusEx failed: {e}")))?;

    Ok(MemorySample {
        process_bytes: counters.WorkingSetSize as u64,
        available_bytes: status.ullAvailPhys,
        total_bytes: status.ullTotalPhys,
        collections: None,
    })
}
