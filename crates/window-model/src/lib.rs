//! IdeLens Window Model
//!
//! Defines the core data contracts shared by every engine stage:
//! - **Windows:** discovered windows and their semantic types
//! - **Classification:** which strategy resolved a window's type, and when
//! - **Process validation:** why a window was kept or skipped
//! - **Layout:** docking sides and pairwise overlaps around the main window
//! - **Memory:** risk levels and allocation assessments
//! - **Capture:** encoded images, annotations, and structured rejections
//!
//! Everything here is plain data: serializable, cloneable, and immutable
//! once handed out by the stage that produced it.

pub mod capture;
pub mod layout;
pub mod memory;
pub mod process;
pub mod window;

pub use capture::*;
pub use layout::*;
pub use memory::*;
pub use process::*;
pub use window::*;

pub use idelens_platform_core::{ProcessId, Rect, WindowHandle};
