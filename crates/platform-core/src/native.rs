//! Contracts for the native collaborators the engine consumes.
//!
//! Implementations live in the platform crates. All calls are synchronous and
//! may block; the engine marshals them onto blocking workers.

use idelens_common::error::IdelensResult;
use serde::{Deserialize, Serialize};

use crate::{ProcessId, Rect, WindowHandle};

/// One window as reported by the OS window tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeWindow {
    pub handle: WindowHandle,
    /// Owning parent for child windows; `None` for top-level windows.
    pub parent: Option<WindowHandle>,
    pub title: String,
    pub class_name: String,
    pub visible: bool,
    pub rect: Rect,
}

/// Walks the OS window tree.
pub trait WindowSource: Send + Sync {
    /// All top-level windows, in z-order.
    fn top_level_windows(&self) -> IdelensResult<Vec<NativeWindow>>;

    /// Direct children of `parent`.
    fn child_windows(&self, parent: WindowHandle) -> IdelensResult<Vec<NativeWindow>>;

    /// Look up a single window. `Ok(None)` when the handle no longer exists.
    fn window(&self, handle: WindowHandle) -> IdelensResult<Option<NativeWindow>>;
}

/// Failure categories of process identity resolution, most specific first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessLookupError {
    #[error("process not found")]
    NotFound,

    #[error("process has terminated")]
    Terminated,

    #[error("access denied")]
    AccessDenied,

    #[error("{0}")]
    Other(String),
}

/// Description of a live process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescription {
    /// Executable name without directory or extension.
    pub name: String,
    pub is_responding: bool,
    pub has_exited: bool,
}

/// Resolves window ownership and describes processes.
pub trait ProcessResolver: Send + Sync {
    /// The process owning `window`.
    fn resolve(&self, window: WindowHandle) -> Result<ProcessId, ProcessLookupError>;

    /// Name and liveness of `pid`.
    fn describe(&self, pid: ProcessId) -> Result<ProcessDescription, ProcessLookupError>;
}

/// A device context borrowed from a window. Must be handed back through
/// [`CapturePrimitive::release_device_context`] exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceContext(pub u64);

/// Raw pixels returned by a capture, tightly packed RGBA8.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl PixelBuffer {
    /// A failed capture yields an empty buffer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the buffer carries no usable pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0
            || self.height == 0
            || self.rgba.len() < self.width as usize * self.height as usize * 4
    }
}

/// Pixel capture from a window's device context.
pub trait CapturePrimitive: Send + Sync {
    fn acquire_device_context(&self, window: WindowHandle) -> IdelensResult<DeviceContext>;

    fn release_device_context(&self, window: WindowHandle, dc: DeviceContext)
        -> IdelensResult<()>;

    /// Copy `width x height` pixels starting at `(x, y)` in window coordinates.
    /// Returns an empty buffer on failure.
    fn capture(&self, dc: DeviceContext, x: i32, y: i32, width: u32, height: u32)
        -> PixelBuffer;
}

/// One reading of process and system memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemorySample {
    /// Resident/working-set bytes of this process.
    pub process_bytes: u64,
    /// Memory available to new allocations system-wide.
    pub available_bytes: u64,
    /// Total physical memory.
    pub total_bytes: u64,
    /// Allocator/GC collection counter where the platform exposes one.
    pub collections: Option<u64>,
}

impl MemorySample {
    /// Available memory as a fraction of total, `1.0` when total is unknown.
    pub fn available_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.available_bytes as f64 / self.total_bytes as f64
    }
}

/// Samples memory usage.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> IdelensResult<MemorySample>;
}
