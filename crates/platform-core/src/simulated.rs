//! In-memory desktop implementing every native contract.
//!
//! Backs the CLI `--simulate` mode and the test suites of the engine crates.
//! Faults can be injected per process or per window, and every native call
//! that matters for resource accounting is counted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use idelens_common::error::{IdelensError, IdelensResult};
use parking_lot::Mutex;

use crate::native::{
    CapturePrimitive, DeviceContext, MemoryProbe, MemorySample, NativeWindow, PixelBuffer,
    ProcessDescription, ProcessLookupError, ProcessResolver, WindowSource,
};
use crate::{ProcessId, Rect, WindowHandle};

#[derive(Debug, Clone)]
struct SimProcess {
    name: String,
    responding: bool,
    exited: bool,
    fault: Option<ProcessLookupError>,
}

#[derive(Debug, Clone)]
struct SimWindow {
    native: NativeWindow,
    pid: ProcessId,
}

#[derive(Debug, Default)]
struct SimState {
    windows: Vec<SimWindow>,
    processes: HashMap<ProcessId, SimProcess>,
    failing_captures: HashSet<WindowHandle>,
    open_dcs: HashMap<u64, WindowHandle>,
    memory: MemorySample,
    walk_delay: Duration,
    describe_delay: Duration,
    capture_delay: Duration,
}

/// A scripted desktop.
#[derive(Debug, Default)]
pub struct SimulatedDesktop {
    state: Mutex<SimState>,
    next_dc: AtomicU64,
    capture_calls: AtomicU64,
    dcs_acquired: AtomicU64,
    dcs_released: AtomicU64,
    describe_calls: AtomicU64,
}

const GIB: u64 = 1024 * 1024 * 1024;

impl SimulatedDesktop {
    /// An empty desktop with 16 GiB of memory, 8 GiB available, and a 200 MiB process.
    pub fn new() -> Self {
        let desktop = Self::default();
        desktop.set_memory(MemorySample {
            process_bytes: 200 * 1024 * 1024,
            available_bytes: 8 * GIB,
            total_bytes: 16 * GIB,
            collections: Some(0),
        });
        desktop
    }

    /// A desktop showing one IDE instance with its usual tool windows, plus a
    /// system shell window (PID 4) and an unrelated editor.
    pub fn ide_session() -> Self {
        let desktop = Self::new();
        desktop.add_process(4200, "devenv");
        desktop.add_process(4, "System");
        desktop.add_process(5100, "notepad");
        desktop.set_process_fault(4, ProcessLookupError::AccessDenied);

        let main = WindowHandle(0x1000);
        desktop.add_window(
            4200,
            window(
                main,
                None,
                "Contoso.sln - Microsoft Visual Studio",
                "HwndWrapper[DefaultDomain;;4f2a]",
                Rect::new(0, 0, 1920, 1080),
            ),
        );
        desktop.add_window(
            4200,
            window(
                WindowHandle(0x1001),
                Some(main),
                "Toolbox",
                "GenericPane",
                Rect::new(0, 80, 300, 800),
            ),
        );
        desktop.add_window(
            4200,
            window(
                WindowHandle(0x1002),
                Some(main),
                "Solution Explorer",
                "GenericPane",
                Rect::new(1620, 80, 300, 600),
            ),
        );
        desktop.add_window(
            4200,
            window(
                WindowHandle(0x1003),
                Some(main),
                "Properties",
                "GenericPane",
                Rect::new(1620, 680, 300, 400),
            ),
        );
        desktop.add_window(
            4200,
            window(
                WindowHandle(0x1004),
                Some(main),
                "Error List",
                "GenericPane",
                Rect::new(300, 880, 1320, 200),
            ),
        );
        desktop.add_window(
            4200,
            window(
                WindowHandle(0x1005),
                Some(main),
                "Program.cs",
                "VsTextEditPane",
                Rect::new(300, 80, 1320, 800),
            ),
        );
        desktop.add_window(
            4200,
            window(
                WindowHandle(0x1006),
                Some(WindowHandle(0x1005)),
                "",
                "VsEditorSurface",
                Rect::new(340, 110, 1280, 770),
            ),
        );
        desktop.add_window(
            4,
            window(
                WindowHandle(0x2000),
                None,
                "Program Manager",
                "Progman",
                Rect::new(0, 0, 1920, 1080),
            ),
        );
        desktop.add_window(
            5100,
            window(
                WindowHandle(0x3000),
                None,
                "notes.txt - Notepad",
                "Notepad",
                Rect::new(200, 200, 800, 600),
            ),
        );
        desktop
    }

    pub fn add_process(&self, pid: u32, name: &str) {
        self.state.lock().processes.insert(
            ProcessId(pid),
            SimProcess {
                name: name.to_string(),
                responding: true,
                exited: false,
                fault: None,
            },
        );
    }

    /// Make every lookup of `pid` fail with `fault`.
    pub fn set_process_fault(&self, pid: u32, fault: ProcessLookupError) {
        if let Some(process) = self.state.lock().processes.get_mut(&ProcessId(pid)) {
            process.fault = Some(fault);
        }
    }

    pub fn set_process_responding(&self, pid: u32, responding: bool) {
        if let Some(process) = self.state.lock().processes.get_mut(&ProcessId(pid)) {
            process.responding = responding;
        }
    }

    pub fn set_process_exited(&self, pid: u32, exited: bool) {
        if let Some(process) = self.state.lock().processes.get_mut(&ProcessId(pid)) {
            process.exited = exited;
        }
    }

    pub fn add_window(&self, pid: u32, native: NativeWindow) {
        self.state.lock().windows.push(SimWindow {
            native,
            pid: ProcessId(pid),
        });
    }

    pub fn remove_window(&self, handle: WindowHandle) {
        self.state
            .lock()
            .windows
            .retain(|w| w.native.handle != handle);
    }

    /// Captures of `handle` return an empty buffer.
    pub fn fail_capture(&self, handle: WindowHandle) {
        self.state.lock().failing_captures.insert(handle);
    }

    pub fn set_memory(&self, sample: MemorySample) {
        self.state.lock().memory = sample;
    }

    pub fn set_process_memory(&self, bytes: u64) {
        self.state.lock().memory.process_bytes = bytes;
    }

    /// Delay applied once per `top_level_windows`/`child_windows` call.
    pub fn set_walk_delay(&self, delay: Duration) {
        self.state.lock().walk_delay = delay;
    }

    /// Delay applied to every `describe` call.
    pub fn set_describe_delay(&self, delay: Duration) {
        self.state.lock().describe_delay = delay;
    }

    /// Delay applied to every `capture` call.
    pub fn set_capture_delay(&self, delay: Duration) {
        self.state.lock().capture_delay = delay;
    }

    /// Number of `capture` calls issued so far.
    pub fn capture_calls(&self) -> u64 {
        self.capture_calls.load(Ordering::SeqCst)
    }

    /// Number of `describe` calls issued so far.
    pub fn describe_calls(&self) -> u64 {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn device_contexts_acquired(&self) -> u64 {
        self.dcs_acquired.load(Ordering::SeqCst)
    }

    pub fn device_contexts_released(&self) -> u64 {
        self.dcs_released.load(Ordering::SeqCst)
    }

    /// Device contexts acquired but not yet released.
    pub fn open_device_contexts(&self) -> usize {
        self.state.lock().open_dcs.len()
    }

    fn pause(delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

fn window(
    handle: WindowHandle,
    parent: Option<WindowHandle>,
    title: &str,
    class_name: &str,
    rect: Rect,
) -> NativeWindow {
    NativeWindow {
        handle,
        parent,
        title: title.to_string(),
        class_name: class_name.to_string(),
        visible: true,
        rect,
    }
}

impl WindowSource for SimulatedDesktop {
    fn top_level_windows(&self) -> IdelensResult<Vec<NativeWindow>> {
        let (delay, windows) = {
            let state = self.state.lock();
            let windows = state
                .windows
                .iter()
                .filter(|w| w.native.parent.is_none())
                .map(|w| w.native.clone())
                .collect::<Vec<_>>();
            (state.walk_delay, windows)
        };
        Self::pause(delay);
        Ok(windows)
    }

    fn child_windows(&self, parent: WindowHandle) -> IdelensResult<Vec<NativeWindow>> {
        let (delay, windows) = {
            let state = self.state.lock();
            let windows = state
                .windows
                .iter()
                .filter(|w| w.native.parent == Some(parent))
                .map(|w| w.native.clone())
                .collect::<Vec<_>>();
            (state.walk_delay, windows)
        };
        Self::pause(delay);
        Ok(windows)
    }

    fn window(&self, handle: WindowHandle) -> IdelensResult<Option<NativeWindow>> {
        Ok(self
            .state
            .lock()
            .windows
            .iter()
            .find(|w| w.native.handle == handle)
            .map(|w| w.native.clone()))
    }
}

impl ProcessResolver for SimulatedDesktop {
    fn resolve(&self, window: WindowHandle) -> Result<ProcessId, ProcessLookupError> {
        self.state
            .lock()
            .windows
            .iter()
            .find(|w| w.native.handle == window)
            .map(|w| w.pid)
            .ok_or(ProcessLookupError::NotFound)
    }

    fn describe(&self, pid: ProcessId) -> Result<ProcessDescription, ProcessLookupError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, process) = {
            let state = self.state.lock();
            (state.describe_delay, state.processes.get(&pid).cloned())
        };
        Self::pause(delay);

        let process = process.ok_or(ProcessLookupError::NotFound)?;
        if let Some(fault) = process.fault {
            return Err(fault);
        }
        Ok(ProcessDescription {
            name: process.name,
            is_responding: process.responding,
            has_exited: process.exited,
        })
    }
}

impl CapturePrimitive for SimulatedDesktop {
    fn acquire_device_context(&self, window: WindowHandle) -> IdelensResult<DeviceContext> {
        let mut state = self.state.lock();
        if !state.windows.iter().any(|w| w.native.handle == window) {
            return Err(IdelensError::platform(format!(
                "window {window} no longer exists"
            )));
        }
        let dc = self.next_dc.fetch_add(1, Ordering::SeqCst) + 1;
        state.open_dcs.insert(dc, window);
        self.dcs_acquired.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceContext(dc))
    }

    fn release_device_context(
        &self,
        window: WindowHandle,
        dc: DeviceContext,
    ) -> IdelensResult<()> {
        let mut state = self.state.lock();
        match state.open_dcs.remove(&dc.0) {
            Some(owner) if owner == window => {
                self.dcs_released.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Some(owner) => {
                state.open_dcs.insert(dc.0, owner);
                Err(IdelensError::platform(format!(
                    "device context {} belongs to {owner}, not {window}",
                    dc.0
                )))
            }
            None => Err(IdelensError::platform(format!(
                "device context {} released twice",
                dc.0
            ))),
        }
    }

    fn capture(&self, dc: DeviceContext, _x: i32, _y: i32, width: u32, height: u32) -> PixelBuffer {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, window) = {
            let state = self.state.lock();
            let window = state
                .open_dcs
                .get(&dc.0)
                .copied()
                .filter(|w| !state.failing_captures.contains(w))
                .filter(|w| state.windows.iter().any(|sw| sw.native.handle == *w));
            (state.capture_delay, window)
        };
        Self::pause(delay);

        let Some(window) = window else {
            return PixelBuffer::empty();
        };
        let shade = (window.0 & 0xff) as u8;
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            rgba.extend_from_slice(&[shade, 0x40, 0x80, 0xff]);
        }
        PixelBuffer {
            width,
            height,
            rgba,
        }
    }
}

impl MemoryProbe for SimulatedDesktop {
    fn sample(&self) -> IdelensResult<MemorySample> {
        Ok(self.state.lock().memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_contexts_are_tracked() {
        let desktop = SimulatedDesktop::ide_session();
        let handle = WindowHandle(0x1002);
        let dc = desktop.acquire_device_context(handle).unwrap();
        assert_eq!(desktop.open_device_contexts(), 1);

        let pixels = desktop.capture(dc, 0, 0, 4, 2);
        assert_eq!(pixels.rgba.len(), 32);
        assert!(!pixels.is_empty());

        desktop.release_device_context(handle, dc).unwrap();
        assert!(desktop.release_device_context(handle, dc).is_err());
        assert_eq!(desktop.open_device_contexts(), 0);
        assert_eq!(desktop.capture_calls(), 1);
    }

    #[test]
    fn process_faults_are_reported() {
        let desktop = SimulatedDesktop::ide_session();
        let pid = desktop.resolve(WindowHandle(0x2000)).unwrap();
        assert_eq!(pid, ProcessId(4));
        assert_eq!(desktop.describe(pid), Err(ProcessLookupError::AccessDenied));
        assert_eq!(
            desktop.describe(ProcessId(999)),
            Err(ProcessLookupError::NotFound)
        );
    }

    #[test]
    fn failing_capture_returns_empty_buffer() {
        let desktop = SimulatedDesktop::ide_session();
        let handle = WindowHandle(0x1004);
        desktop.fail_capture(handle);
        let dc = desktop.acquire_device_context(handle).unwrap();
        assert!(desktop.capture(dc, 0, 0, 10, 10).is_empty());
        desktop.release_device_context(handle, dc).unwrap();
    }
}
