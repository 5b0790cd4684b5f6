//! Process identity and liveness via `OpenProcess`.

use idelens_platform_core::{ProcessDescription, ProcessId, ProcessLookupError, WindowHandle};
use windows::core::PWSTR;
use windows::Win32::Foundation::{
    CloseHandle, BOOL, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE, HWND, LPARAM,
};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowThreadProcessId, IsHungAppWindow,
};

use super::to_hwnd;

const STILL_ACTIVE: u32 = 259;

/// Closes the process handle when dropped.
struct ProcessHandle(HANDLE);

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from OpenProcess and is closed exactly once.
        if let Err(e) = unsafe { CloseHandle(self.0) } {
            tracing::warn!(error = %e, "CloseHandle failed for process handle");
        }
    }
}

pub fn resolve(window: WindowHandle) -> Result<ProcessId, ProcessLookupError> {
    let mut pid = 0u32;
    // SAFETY: pid is a valid out pointer for the duration of the call.
    let thread = unsafe { GetWindowThreadProcessId(to_hwnd(window), Some(&mut pid)) };
    if thread == 0 || pid == 0 {
        return Err(ProcessLookupError::NotFound);
    }
    Ok(ProcessId(pid))
}

pub fn describe(pid: ProcessId) -> Result<ProcessDescription, ProcessLookupError> {
    // SAFETY: OpenProcess has no pointer arguments.
    let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid.0) }
        .map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                ProcessLookupError::AccessDenied
            } else if e.code() == ERROR_INVALID_PARAMETER.to_hresult() {
                ProcessLookupError::NotFound
            } else {
                ProcessLookupError::Other(format!("OpenProcess({pid}) failed: {e}"))
            }
        })?;
    let handle = ProcessHandle(handle);

    let mut exit_code = 0u32;
    // SAFETY: exit_code is a valid out pointer.
    unsafe { GetExitCodeProcess(handle.0, &mut exit_code) }
        .map_err(|e| ProcessLookupError::Other(format!("GetExitCodeProcess failed: {e}")))?;
    if exit_code != STILL_ACTIVE {
        return Err(ProcessLookupError::Terminated);
    }

    let mut buffer = [0u16; 1024];
    let mut len = buffer.len() as u32;
    // SAFETY: buffer and len describe a writable region owned by this frame.
    unsafe {
        QueryFullProcessImageNameW(
            handle.0,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut len,
        )
    }
    .map_err(|e| {
        if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
            ProcessLookupError::AccessDenied
        } else {
            ProcessLookupError::Other(format!("QueryFullProcessImageNameW failed: {e}"))
        }
    })?;
    let path = String::from_utf16_lossy(&buffer[..len as usize]);

    Ok(ProcessDescription {
        name: image_stem(&path),
        is_responding: !has_hung_window(pid),
        has_exited: false,
    })
}

/// `C:\Program Files\...\devenv.exe` -> `devenv`.
fn image_stem(path: &str) -> String {
    let file = path.rsplit(['\\', '/']).next().unwrap_or(path);
    match file.rfind('.') {
        Some(dot) if dot > 0 => file[..dot].to_string(),
        _ => file.to_string(),
    }
}

struct HungSearch {
    pid: u32,
    hung: bool,
}

unsafe extern "system" fn check_hung(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam points at the HungSearch owned by has_hung_window.
    let search = &mut *(lparam.0 as *mut HungSearch);
    let mut owner = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut owner));
    if owner == search.pid && IsHungAppWindow(hwnd).as_bool() {
        search.hung = true;
        return BOOL(0);
    }
    BOOL(1)
}

/// A process is unresponsive when any of its top-level windows is hung.
fn has_hung_window(pid: ProcessId) -> bool {
    let mut search = HungSearch {
        pid: pid.0,
        hung: false,
    };
    // SAFETY: the callback only touches `search`, which outlives the call.
    // EnumWindows reports an error when the callback stops early; that case
    // is exactly `search.hung`.
    let _ = unsafe {
        EnumWindows(
            Some(check_hung),
            LPARAM(&mut search as *mut HungSearch as isize),
        )
    };
    search.hung
}
