//! Raw Win32 calls. Every `unsafe` block in the crate lives below here.

pub mod gdi;
pub mod memory;
pub mod process;
pub mod window_tree;

use std::ffi::c_void;

use idelens_platform_core::WindowHandle;
use windows::Win32::Foundation::HWND;

pub(crate) fn to_hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as usize as *mut c_void)
}

pub(crate) fn from_hwnd(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as usize as u64)
}
