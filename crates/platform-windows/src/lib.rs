//! Win32 platform backend.
//!
//! [`Win32Platform`] implements every native contract of
//! `idelens-platform-core` on Windows. On other targets it still compiles,
//! but [`Win32Platform::new`] fails with `Unsupported` so callers can fall
//! back to another backend without `cfg` noise of their own.

use idelens_common::error::{IdelensError, IdelensResult};
use idelens_platform_core::{
    Capability, CapturePrimitive, DeviceContext, MemoryProbe, MemorySample, NativeWindow,
    PixelBuffer, ProcessDescription, ProcessId, ProcessLookupError, ProcessResolver,
    WindowHandle, WindowSource,
};

#[cfg(windows)]
mod win32;

/// The Win32 backend.
#[derive(Debug, Clone, Copy)]
pub struct Win32Platform {
    _private: (),
}

impl Win32Platform {
    /// Create the backend. Fails with `Unsupported` outside Windows.
    pub fn new() -> IdelensResult<Self> {
        if cfg!(windows) {
            Ok(Self { _private: () })
        } else {
            Err(IdelensError::unsupported(
                "the Win32 backend is only available on Windows",
            ))
        }
    }
}

/// Report which Win32 facilities are usable on this host.
pub fn check_capabilities() -> Vec<Capability> {
    let windows = cfg!(windows);
    vec![
        Capability::new(
            "IDE Window Tree",
            "EnumWindows/EnumChildWindows window enumeration",
            windows,
            true,
        )
        .with_fix("Run IdeLens on Windows, or pass --simulate"),
        Capability::new(
            "GDI Capture",
            "GetWindowDC + BitBlt pixel capture",
            windows,
            true,
        )
        .with_fix("Run IdeLens on Windows, or pass --simulate"),
        Capability::new(
            "Process Inspection",
            "OpenProcess with PROCESS_QUERY_LIMITED_INFORMATION",
            windows,
            true,
        )
        .with_fix("Run IdeLens on Windows"),
    ]
}

#[cfg(windows)]
impl WindowSource for Win32Platform {
    fn top_level_windows(&self) -> IdelensResult<Vec<NativeWindow>> {
        win32::window_tree::top_level_windows()
    }

    fn child_windows(&self, parent: WindowHandle) -> IdelensResult<Vec<NativeWindow>> {
        win32::window_tree::child_windows(parent)
    }

    fn window(&self, handle: WindowHandle) -> IdelensResult<Option<NativeWindow>> {
        win32::window_tree::window(handle)
    }
}

#[cfg(windows)]
impl ProcessResolver for Win32Platform {
    fn resolve(&self, window: WindowHandle) -> Result<ProcessId, ProcessLookupError> {
        win32::process::resolve(window)
    }

    fn describe(&self, pid: ProcessId) -> Result<ProcessDescription, ProcessLookupError> {
        win32::process::describe(pid)
    }
}

#[cfg(windows)]
impl CapturePrimitive for Win32Platform {
    fn acquire_device_context(&self, window: WindowHandle) -> IdelensResult<DeviceContext> {
        win32::gdi::acquire_device_context(window)
    }

    fn release_device_context(
        &self,
        window: WindowHandle,
        dc: DeviceContext,
    ) -> IdelensResult<()> {
        win32::gdi::release_device_context(window, dc)
    }

    fn capture(&self, dc: DeviceContext, x: i32, y: i32, width: u32, height: u32) -> PixelBuffer {
        win32::gdi::capture(dc, x, y, width, height)
    }
}

#[cfg(windows)]
impl MemoryProbe for Win32Platform {
    fn sample(&self) -> IdelensResult<MemorySample> {
        win32::memory::sample()
    }
}

#[cfg(not(windows))]
impl WindowSource for Win32Platform {
    fn top_level_windows(&self) -> IdelensResult<Vec<NativeWindow>> {
        Err(unsupported())
    }

    fn child_windows(&self, _parent: WindowHandle) -> IdelensResult<Vec<NativeWindow>> {
        Err(unsupported())
    }

    fn window(&self, _handle: WindowHandle) -> IdelensResult<Option<NativeWindow>> {
        Err(unsupported())
    }
}

#[cfg(not(windows))]
impl ProcessResolver for Win32Platform {
    fn resolve(&self, _window: WindowHandle) -> Result<ProcessId, ProcessLookupError> {
        Err(ProcessLookupError::Other(unsupported().to_string()))
    }

    fn describe(&self, _pid: ProcessId) -> Result<ProcessDescription, ProcessLookupError> {
        Err(ProcessLookupError::Other(unsupported().to_string()))
    }
}

#[cfg(not(windows))]
impl CapturePrimitive for Win32Platform {
    fn acquire_device_context(&self, _window: WindowHandle) -> IdelensResult<DeviceContext> {
        Err(unsupported())
    }

    fn release_device_context(
        &self,
        _window: WindowHandle,
        _dc: DeviceContext,
    ) -> IdelensResult<()> {
        Err(unsupported())
    }

    fn capture(
        &self,
        _dc: DeviceContext,
        _x: i32,
        _y: i32,
        _width: u32,
        _height: u32,
    ) -> PixelBuffer {
        PixelBuffer::empty()
    }
}

#[cfg(not(windows))]
impl MemoryProbe for Win32Platform {
    fn sample(&self) -> IdelensResult<MemorySample> {
        Err(unsupported())
    }
}

#[cfg(not(windows))]
fn unsupported() -> IdelensError {
    IdelensError::unsupported("the Win32 backend is only available on Windows")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn construction_fails_off_windows() {
        assert!(matches!(
            Win32Platform::new(),
            Err(IdelensError::Unsupported { .. })
        ));
        assert!(check_capabilities().iter().all(|c| !c.available));
    }

    #[cfg(windows)]
    #[test]
    fn enumerates_top_level_windows() {
        let platform = Win32Platform::new().unwrap();
        let windows = platform.top_level_windows().unwrap();
        assert!(windows.iter().all(|w| !w.handle.is_null()));
        let sample = platform.sample().unwrap();
        assert!(sample.process_bytes > 0);
    }
}
