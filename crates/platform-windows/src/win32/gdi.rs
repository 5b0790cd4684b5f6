//! GDI device-context capture.
//!
//! The window DC is acquired and released by the engine through its lease
//! registry. The memory DC and bitmap used for one `capture` call are local
//! to that call and freed before it returns.

use std::ffi::c_void;

use idelens_common::error::{IdelensError, IdelensResult};
use idelens_platform_core::{DeviceContext, PixelBuffer, WindowHandle};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDIBits,
    GetWindowDC, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
    HBITMAP, HDC, HGDIOBJ, SRCCOPY,
};

use super::to_hwnd;

fn to_hdc(dc: DeviceContext) -> HDC {
    HDC(dc.0 as usize as *mut c_void)
}

pub fn acquire_device_context(window: WindowHandle) -> IdelensResult<DeviceContext> {
    // SAFETY: GetWindowDC returns a null HDC for invalid windows.
    let hdc = unsafe { GetWindowDC(to_hwnd(window)) };
    if hdc.is_invalid() {
        return Err(IdelensError::platform(format!(
            "GetWindowDC failed for window {window}"
        )));
    }
    Ok(DeviceContext(hdc.0 as usize as u64))
}

pub fn release_device_context(window: WindowHandle, dc: DeviceContext) -> IdelensResult<()> {
    // SAFETY: dc was produced by GetWindowDC for this window.
    let released = unsafe { ReleaseDC(to_hwnd(window), to_hdc(dc)) };
    if released == 0 {
        return Err(IdelensError::platform(format!(
            "ReleaseDC failed for window {window}"
        )));
    }
    Ok(())
}

/// Memory DC plus the bitmap selected into it, torn down in reverse order.
struct Surface {
    mem_dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    selected: bool,
}

impl Surface {
    /// Put the original object back. `GetDIBits` needs the bitmap unselected.
    fn deselect(&mut self) {
        if self.selected {
            // SAFETY: `previous` came from the SelectObject that selected `bitmap`.
            unsafe {
                SelectObject(self.mem_dc, self.previous);
            }
            self.selected = false;
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.deselect();
        // SAFETY: both objects were created by `capture` and are deleted once.
        unsafe {
            let _ = DeleteObject(self.bitmap);
            let _ = DeleteDC(self.mem_dc);
        }
    }
}

pub fn capture(dc: DeviceContext, x: i32, y: i32, width: u32, height: u32) -> PixelBuffer {
    if width == 0 || height == 0 {
        return PixelBuffer::empty();
    }
    let (Ok(w), Ok(h)) = (i32::try_from(width), i32::try_from(height)) else {
        return PixelBuffer::empty();
    };
    let source = to_hdc(dc);

    // SAFETY: every GDI object created here is owned by `surface` and freed on
    // drop; the pixel buffer is sized for `height` rows of 32-bit pixels.
    unsafe {
        let mem_dc = CreateCompatibleDC(source);
        if mem_dc.is_invalid() {
            tracing::debug!("CreateCompatibleDC failed");
            return PixelBuffer::empty();
        }
        let bitmap = CreateCompatibleBitmap(source, w, h);
        if bitmap.is_invalid() {
            let _ = DeleteDC(mem_dc);
            tracing::debug!(width, height, "CreateCompatibleBitmap failed");
            return PixelBuffer::empty();
        }
        let previous = SelectObject(mem_dc, bitmap);
        let mut surface = Surface {
            mem_dc,
            bitmap,
            previous,
            selected: true,
        };

        if let Err(e) = BitBlt(surface.mem_dc, 0, 0, w, h, source, x, y, SRCCOPY) {
            tracing::debug!(error = %e, "BitBlt failed");
            return PixelBuffer::empty();
        }

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: w,
                // Negative height: top-down rows.
                biHeight: -h,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        surface.deselect();
        let lines = GetDIBits(
            surface.mem_dc,
            surface.bitmap,
            0,
            height,
            Some(pixels.as_mut_ptr() as *mut c_void),
            &mut info,
            DIB_RGB_COLORS,
        );
        drop(surface);
        if lines != h {
            tracing::debug!(lines, height, "GetDIBits returned a short read");
            return PixelBuffer::empty();
        }

        // BGRA -> RGBA, GDI leaves alpha undefined.
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
            px[3] = 0xff;
        }
        PixelBuffer {
            width,
            height,
            rgba: pixels,
        }
    }
}
