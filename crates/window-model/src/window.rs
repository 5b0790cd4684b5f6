//! Discovered windows and their semantic classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idelens_platform_core::{NativeWindow, ProcessId, Rect, WindowHandle};

/// Semantic role of an IDE window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// The IDE's top-level shell window; the root of layout analysis.
    MainWindow,
    SolutionExplorer,
    Properties,
    ErrorList,
    Output,
    Toolbox,
    ServerExplorer,
    TeamExplorer,
    PackageManager,
    ImmediateWindow,
    Watch,
    CallStack,
    Locals,
    Breakpoints,
    XamlDesigner,
    CodeEditor,
    /// A docked pane whose content could not be identified more precisely.
    ToolWindow,
    Dialog,
    #[default]
    Unknown,
}

impl WindowType {
    /// Every known type, in declaration order.
    pub const ALL: [WindowType; 19] = [
        WindowType::MainWindow,
        WindowType::SolutionExplorer,
        WindowType::Properties,
        WindowType::ErrorList,
        WindowType::Output,
        WindowType::Toolbox,
        WindowType::ServerExplorer,
        WindowType::TeamExplorer,
        WindowType::PackageManager,
        WindowType::ImmediateWindow,
        WindowType::Watch,
        WindowType::CallStack,
        WindowType::Locals,
        WindowType::Breakpoints,
        WindowType::XamlDesigner,
        WindowType::CodeEditor,
        WindowType::ToolWindow,
        WindowType::Dialog,
        WindowType::Unknown,
    ];

    /// Human-readable label used in annotations.
    pub fn label(&self) -> &'static str {
        match self {
            WindowType::MainWindow => "Main Window",
            WindowType::SolutionExplorer => "Solution Explorer",
            WindowType::Properties => "Properties",
            WindowType::ErrorList => "Error List",
            WindowType::Output => "Output",
            WindowType::Toolbox => "Toolbox",
            WindowType::ServerExplorer => "Server Explorer",
            WindowType::TeamExplorer => "Team Explorer",
            WindowType::PackageManager => "Package Manager",
            WindowType::ImmediateWindow => "Immediate Window",
            WindowType::Watch => "Watch",
            WindowType::CallStack => "Call Stack",
            WindowType::Locals => "Locals",
            WindowType::Breakpoints => "Breakpoints",
            WindowType::XamlDesigner => "XAML Designer",
            WindowType::CodeEditor => "Code Editor",
            WindowType::ToolWindow => "Tool Window",
            WindowType::Dialog => "Dialog",
            WindowType::Unknown => "Unknown",
        }
    }

    /// Tool panes hosted inside the main window's dock manager.
    pub fn is_tool_pane(&self) -> bool {
        matches!(
            self,
            WindowType::SolutionExplorer
                | WindowType::Properties
                | WindowType::ErrorList
                | WindowType::Output
                | WindowType::Toolbox
                | WindowType::ServerExplorer
                | WindowType::TeamExplorer
                | WindowType::PackageManager
                | WindowType::ImmediateWindow
                | WindowType::Watch
                | WindowType::CallStack
                | WindowType::Locals
                | WindowType::Breakpoints
                | WindowType::ToolWindow
        )
    }

    /// Document-well content (editors and designers).
    pub fn is_document(&self) -> bool {
        matches!(self, WindowType::CodeEditor | WindowType::XamlDesigner)
    }
}

impl std::fmt::Display for WindowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A validated window from one discovery scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub handle: WindowHandle,
    pub title: String,
    pub class_name: String,
    pub process_id: ProcessId,
    pub visible: bool,
    pub rect: Rect,
    /// Semantic type; `Unknown` until classified.
    pub window_type: WindowType,
    /// Lookup-only reference to the parent window.
    pub parent: Option<WindowHandle>,
    /// Children retained in the same scan, in discovery order.
    pub children: Vec<WindowHandle>,
}

impl Window {
    /// Build an unclassified window from a native description.
    pub fn from_native(native: NativeWindow, process_id: ProcessId) -> Self {
        Self {
            handle: native.handle,
            title: native.title,
            class_name: native.class_name,
            process_id,
            visible: native.visible,
            rect: native.rect,
            window_type: WindowType::Unknown,
            parent: native.parent,
            children: Vec::new(),
        }
    }

    /// Whether this window is the IDE's main window.
    pub fn is_main(&self) -> bool {
        self.window_type == WindowType::MainWindow
    }
}

/// Which link of the strategy chain produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStrategy {
    Title,
    ClassName,
    Relationship,
    Content,
    /// No strategy matched; the type is `Unknown`.
    Unresolved,
}

/// Outcome of classifying one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub handle: WindowHandle,
    pub window_type: WindowType,
    pub strategy: ClassificationStrategy,
    pub classified_at: DateTime<Utc>,
}

/// A discovered window paired with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedWindow {
    pub window: Window,
    pub classification: ClassificationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_type_serializes_snake_case() {
        let json = serde_json::to_string(&WindowType::SolutionExplorer).unwrap();
        assert_eq!(json, "\"solution_explorer\"");
        let parsed: WindowType = serde_json::from_str("\"xaml_designer\"").unwrap();
        assert_eq!(parsed, WindowType::XamlDesigner);
    }

    #[test]
    fn all_lists_every_type_once() {
        let mut seen = std::collections::HashSet::new();
        for t in WindowType::ALL {
            assert!(seen.insert(t));
        }
        assert!(!WindowType::MainWindow.is_tool_pane());
        assert!(WindowType::ErrorList.is_tool_pane());
        assert!(WindowType::CodeEditor.is_document());
    }

    #[test]
    fn from_native_starts_unclassified() {
        let native = NativeWindow {
            handle: WindowHandle(7),
            parent: Some(WindowHandle(1)),
            title: "Output".to_string(),
            class_name: "GenericPane".to_string(),
            visible: true,
            rect: Rect::new(0, 0, 10, 10),
        };
        let window = Window::from_native(native, ProcessId(42));
        assert_eq!(window.window_type, WindowType::Unknown);
        assert_eq!(window.parent, Some(WindowHandle(1)));
        assert!(window.children.is_empty());
    }
}
