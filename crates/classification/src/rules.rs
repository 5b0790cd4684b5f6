//! Rule tables: title patterns and class-name sets per window type.
//!
//! Rules are plain data so they can be shipped as JSON and swapped without a
//! rebuild. Order matters: title rules are tried top to bottom, so the main
//! window comes first and the XAML designer precedes the generic code editor.

use std::path::Path;

use idelens_common::error::{IdelensError, IdelensResult};
use idelens_window_model::WindowType;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Compiled regex size cap per pattern.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Title patterns for one window type, tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRule {
    pub window_type: WindowType,
    pub patterns: Vec<String>,
}

/// Known native class names for one window type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRule {
    pub window_type: WindowType,
    pub class_names: Vec<String>,
}

/// Serializable rule tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRules {
    pub title_rules: Vec<TitleRule>,
    pub class_rules: Vec<ClassRule>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self::builtin()
    }
}

fn title(window_type: WindowType, patterns: &[&str]) -> TitleRule {
    TitleRule {
        window_type,
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
    }
}

fn class(window_type: WindowType, class_names: &[&str]) -> ClassRule {
    ClassRule {
        window_type,
        class_names: class_names.iter().map(|c| c.to_string()).collect(),
    }
}

impl ClassificationRules {
    /// Rules for the IDE's standard shell and tool windows.
    pub fn builtin() -> Self {
        use WindowType::*;
        Self {
            title_rules: vec![
                title(MainWindow, &[r"\s-\sMicrosoft Visual Studio", r"^Microsoft Visual Studio$"]),
                title(SolutionExplorer, &[r"^Solution Explorer\b"]),
                title(Properties, &[r"^Properties\b"]),
                title(ErrorList, &[r"^Error List\b"]),
                title(Output, &[r"^Output\b"]),
                title(Toolbox, &[r"^Toolbox\b"]),
                title(ServerExplorer, &[r"^Server Explorer\b"]),
                title(TeamExplorer, &[r"^Team Explorer\b", r"^Git Changes\b"]),
                title(PackageManager, &[r"^NuGet\b", r"^Package Manager Console\b"]),
                title(ImmediateWindow, &[r"^Immediate( Window)?\b"]),
                title(Watch, &[r"^Watch( \d)?$"]),
                title(CallStack, &[r"^Call Stack\b"]),
                title(Locals, &[r"^Locals\b", r"^Autos\b"]),
                title(Breakpoints, &[r"^Breakpoints\b"]),
                title(XamlDesigner, &[r"\.xaml( \[Design\])?\*?$"]),
                title(
                    CodeEditor,
                    &[r"\.(cs|vb|fs|cpp|cc|c|h|hpp|ts|tsx|js|jsx|json|xml|config|razor|cshtml|sql|py)\*?$"],
                ),
            ],
            class_rules: vec![
                class(CodeEditor, &["VsTextEditPane", "VsEditorPane"]),
                class(XamlDesigner, &["XamlDesignerPane"]),
                class(Dialog, &["#32770"]),
                class(ToolWindow, &["GenericPane", "ToolWindowPane"]),
            ],
        }
    }

    /// Load rules from a JSON file.
    pub fn load_from(path: &Path) -> IdelensResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let rules: Self = serde_json::from_str(&content)?;
        Ok(rules)
    }

    /// Compile every pattern. Fails on the first invalid pattern.
    pub fn compile(&self) -> IdelensResult<CompiledRules> {
        let mut titles = Vec::new();
        for rule in &self.title_rules {
            for pattern in &rule.patterns {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .size_limit(PATTERN_SIZE_LIMIT)
                    .build()
                    .map_err(|e| {
                        IdelensError::config(format!(
                            "invalid title pattern {pattern:?} for {}: {e}",
                            rule.window_type
                        ))
                    })?;
                titles.push((rule.window_type, regex));
            }
        }
        let classes = self
            .class_rules
            .iter()
            .flat_map(|rule| {
                rule.class_names
                    .iter()
                    .map(move |name| (rule.window_type, normalize_class_name(name).to_string()))
            })
            .collect();
        Ok(CompiledRules { titles, classes })
    }
}

/// Rules ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    /// `(type, pattern)` in priority order.
    pub(crate) titles: Vec<(WindowType, Regex)>,
    /// `(type, normalized class name)` in priority order.
    pub(crate) classes: Vec<(WindowType, String)>,
}

impl CompiledRules {
    pub fn pattern_count(&self) -> usize {
        self.titles.len()
    }

    /// First type whose class set contains `class_name` after normalization.
    pub fn match_class(&self, class_name: &str) -> Option<WindowType> {
        let normalized = normalize_class_name(class_name);
        if normalized.is_empty() {
            return None;
        }
        self.classes
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(normalized))
            .map(|(window_type, _)| *window_type)
    }
}

/// Drop a bracketed instance suffix such as `HwndWrapper[DefaultDomain;;4f2a]`.
pub fn normalize_class_name(class_name: &str) -> &str {
    class_name
        .split_once('[')
        .map_or(class_name, |(base, _)| base)
        .trim()
}
