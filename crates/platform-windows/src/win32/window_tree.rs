//! Window tree walk via `EnumWindows`/`EnumChildWindows`.
//!
//! The enumeration APIs are callback based; the callback only collects
//! handles and all per-window queries happen afterwards on the calling thread.

use idelens_common::error::{IdelensError, IdelensResult};
use idelens_platform_core::{NativeWindow, Rect, WindowHandle};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumWindows, GetAncestor, GetClassNameW, GetDesktopWindow, GetWindowRect,
    GetWindowTextW, IsWindow, IsWindowVisible, GA_PARENT,
};

use super::{from_hwnd, to_hwnd};

unsafe extern "system" fn collect_handle(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is the address of the Vec passed by the enumerating caller,
    // which outlives the synchronous enumeration.
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(hwnd);
    BOOL(1)
}

pub fn top_level_windows() -> IdelensResult<Vec<NativeWindow>> {
    let mut handles: Vec<HWND> = Vec::new();
    // SAFETY: the callback only pushes into `handles`.
    unsafe {
        EnumWindows(
            Some(collect_handle),
            LPARAM(&mut handles as *mut Vec<HWND> as isize),
        )
    }
    .map_err(|e| IdelensError::platform(format!("EnumWindows failed: {e}")))?;

    Ok(handles
        .into_iter()
        .filter_map(|hwnd| describe(hwnd, None))
        .collect())
}

pub fn child_windows(parent: WindowHandle) -> IdelensResult<Vec<NativeWindow>> {
    let parent_hwnd = to_hwnd(parent);
    let mut handles: Vec<HWND> = Vec::new();
    // SAFETY: the callback only pushes into `handles`. The return value carries
    // no error information for this API.
    unsafe {
        let _ = EnumChildWindows(
            parent_hwnd,
            Some(collect_handle),
            LPARAM(&mut handles as *mut Vec<HWND> as isize),
        );
    }

    // EnumChildWindows walks all descendants; keep direct children only.
    Ok(handles
        .into_iter()
        .filter(|hwnd| unsafe { GetAncestor(*hwnd, GA_PARENT) } == parent_hwnd)
        .filter_map(|hwnd| describe(hwnd, Some(parent)))
        .collect())
}

pub fn window(handle: WindowHandle) -> IdelensResult<Option<NativeWindow>> {
    let hwnd = to_hwnd(handle);
    // SAFETY: IsWindow accepts any value and reports whether it names a window.
    if !unsafe { IsWindow(hwnd) }.as_bool() {
        return Ok(None);
    }
    let parent = unsafe { GetAncestor(hwnd, GA_PARENT) };
    let desktop = unsafe { GetDesktopWindow() };
    let parent = if parent.0.is_null() || parent == desktop {
        None
    } else {
        Some(from_hwnd(parent))
    };
    Ok(describe(hwnd, parent))
}

/// Query title, class, visibility, and bounds. `None` when the window vanished
/// between enumeration and query.
fn describe(hwnd: HWND, parent: Option<WindowHandle>) -> Option<NativeWindow> {
    let mut rect = RECT::default();
    // SAFETY: all buffers are owned locally and sized by the slice length.
    unsafe {
        GetWindowRect(hwnd, &mut rect).ok()?;

        let mut title = [0u16; 512];
        let title_len = GetWindowTextW(hwnd, &mut title).max(0) as usize;
        let mut class = [0u16; 256];
        let class_len = GetClassNameW(hwnd, &mut class).max(0) as usize;

        Some(NativeWindow {
            handle: from_hwnd(hwnd),
            parent,
            title: String::from_utf16_lossy(&title[..title_len]),
            class_name: String::from_utf16_lossy(&class[..class_len]),
            visible: IsWindowVisible(hwnd).as_bool(),
            rect: Rect::new(
                rect.left,
                rect.top,
                rect.right - rect.left,
                rect.bottom - rect.top,
            ),
        })
    }
}
