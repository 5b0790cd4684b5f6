//! The classification strategy chain.
//!
//! Each strategy is a plain function from a window and its context to an
//! optional type. The chain tries them in order and stops at the first
//! `Some`.

use std::time::{Duration, Instant};

use idelens_window_model::{ClassificationStrategy, Window, WindowType};

use crate::rules::CompiledRules;

/// Content-based classification hook.
pub trait ContentInspector: Send + Sync {
    fn inspect(&self, window: &Window) -> Option<WindowType>;
}

/// The default inspector: never classifies anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContentInspection;

impl ContentInspector for NoContentInspection {
    fn inspect(&self, _window: &Window) -> Option<WindowType> {
        None
    }
}

/// Everything a strategy may read besides the window itself.
pub struct ClassifyContext<'a> {
    pub rules: &'a CompiledRules,
    /// The parent's resolved type, if the parent was classified.
    pub parent_type: Option<WindowType>,
    pub inspector: &'a dyn ContentInspector,
    /// Soft per-pattern time budget, checked once the match has returned.
    pub pattern_budget: Duration,
    /// Titles are matched on at most this many characters.
    pub max_title_chars: usize,
}

pub type Strategy = fn(&Window, &ClassifyContext<'_>) -> Option<WindowType>;

/// Ordered strategies.
#[derive(Clone)]
pub struct StrategyChain {
    links: Vec<(ClassificationStrategy, Strategy)>,
}

impl std::fmt::Debug for StrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.links.iter().map(|(strategy, _)| strategy))
            .finish()
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl StrategyChain {
    /// Title, class name, relationship, content.
    pub fn standard() -> Self {
        Self {
            links: vec![
                (ClassificationStrategy::Title, by_title as Strategy),
                (ClassificationStrategy::ClassName, by_class_name),
                (ClassificationStrategy::Relationship, by_relationship),
                (ClassificationStrategy::Content, by_content),
            ],
        }
    }

    /// A chain with only the given strategies, in the given order.
    pub fn with_links(links: Vec<(ClassificationStrategy, Strategy)>) -> Self {
        Self { links }
    }

    /// Run the chain. `Unknown` answers count as no answer.
    pub fn evaluate(
        &self,
        window: &Window,
        ctx: &ClassifyContext<'_>,
    ) -> (WindowType, ClassificationStrategy) {
        self.links
            .iter()
            .find_map(|(strategy, run)| {
                run(window, ctx)
                    .filter(|t| *t != WindowType::Unknown)
                    .map(|t| (t, *strategy))
            })
            .unwrap_or((WindowType::Unknown, ClassificationStrategy::Unresolved))
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Title pattern match. A pattern that runs past its budget is logged and
/// treated as no match.
///
/// The budget is checked after the match returns and cannot interrupt a
/// match in progress. Matching stays bounded because `regex` runs in time
/// linear in the input and titles are cut to `max_title_chars` first.
pub fn by_title(window: &Window, ctx: &ClassifyContext<'_>) -> Option<WindowType> {
    let title = truncate_chars(window.title.trim(), ctx.max_title_chars);
    if title.is_empty() {
        return None;
    }
    for (window_type, pattern) in &ctx.rules.titles {
        let started = Instant::now();
        let matched = pattern.is_match(title);
        let elapsed = started.elapsed();
        if elapsed > ctx.pattern_budget {
            tracing::warn!(
                window = %window.handle,
                pattern = pattern.as_str(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Title pattern exceeded its time budget, ignoring result"
            );
            continue;
        }
        if matched {
            return Some(*window_type);
        }
    }
    None
}

/// Class-name set membership.
pub fn by_class_name(window: &Window, ctx: &ClassifyContext<'_>) -> Option<WindowType> {
    ctx.rules.match_class(&window.class_name)
}

/// Derive a type from the parent's type.
///
/// Children of the main window are tool panes; children of a pane, a
/// document, or a dialog take the parent's type.
pub fn by_relationship(_window: &Window, ctx: &ClassifyContext<'_>) -> Option<WindowType> {
    let parent = ctx.parent_type?;
    match parent {
        WindowType::MainWindow => Some(WindowType::ToolWindow),
        WindowType::Dialog => Some(WindowType::Dialog),
        t if t.is_tool_pane() || t.is_document() => Some(t),
        _ => None,
    }
}

/// Delegate to the installed content inspector.
pub fn by_content(window: &Window, ctx: &ClassifyContext<'_>) -> Option<WindowType> {
    ctx.inspector.inspect(window)
}

#[cfg(test)]
mod tests {
    use idelens_platform_core::{ProcessId, Rect, WindowHandle};

    use super::*;
    use crate::rules::ClassificationRules;

    fn window(title: &str, class_name: &str) -> Window {
        Window {
            handle: WindowHandle(1),
            title: title.to_string(),
            class_name: class_name.to_string(),
            process_id: ProcessId(1),
            visible: true,
            rect: Rect::new(0, 0, 100, 100),
            window_type: WindowType::Unknown,
            parent: None,
            children: vec![],
        }
    }

    fn ctx<'a>(rules: &'a CompiledRules, parent_type: Option<WindowType>) -> ClassifyContext<'a> {
        ClassifyContext {
            rules,
            parent_type,
            inspector: &NoContentInspection,
            pattern_budget: Duration::from_secs(1),
            max_title_chars: 512,
        }
    }

    #[test]
    fn title_patterns_follow_rule_order() {
        let rules = ClassificationRules::builtin().compile().unwrap();
        let c = ctx(&rules, None);
        let cases = [
            ("Contoso.sln - Microsoft Visual Studio", WindowType::MainWindow),
            ("Microsoft Visual Studio", WindowType::MainWindow),
            ("solution explorer", WindowType::SolutionExplorer),
            ("Watch 1", WindowType::Watch),
            ("Package Manager Console", WindowType::PackageManager),
            ("MainWindow.xaml [Design]", WindowType::XamlDesigner),
            ("MainWindow.xaml.cs", WindowType::CodeEditor),
            ("Program.cs*", WindowType::CodeEditor),
        ];
        for (title, expected) in cases {
            assert_eq!(by_title(&window(title, ""), &c), Some(expected), "{title}");
        }
        assert_eq!(by_title(&window("Random Notes", ""), &c), None);
    }

    #[test]
    fn long_titles_are_truncated_before_matching() {
        let rules = ClassificationRules::builtin().compile().unwrap();
        let mut c = ctx(&rules, None);
        c.max_title_chars = 8;
        assert_eq!(by_title(&window("Output - Build", ""), &c), Some(WindowType::Output));
        assert_eq!(by_title(&window("Program.cs", ""), &c), None);
    }

    #[test]
    fn relationship_derives_from_parent() {
        let rules = ClassificationRules::builtin().compile().unwrap();
        let w = window("", "VsEditorSurface");
        assert_eq!(by_relationship(&w, &ctx(&rules, None)), None);
        assert_eq!(
            by_relationship(&w, &ctx(&rules, Some(WindowType::CodeEditor))),
            Some(WindowType::CodeEditor)
        );
        assert_eq!(
            by_relationship(&w, &ctx(&rules, Some(WindowType::MainWindow))),
            Some(WindowType::ToolWindow)
        );
        assert_eq!(
            by_relationship(&w, &ctx(&rules, Some(WindowType::Unknown))),
            None
        );
    }

    #[test]
    fn chain_reports_the_winning_strategy() {
        let rules = ClassificationRules::builtin().compile().unwrap();
        let chain = StrategyChain::standard();
        let c = ctx(&rules, Some(WindowType::MainWindow));

        assert_eq!(
            chain.evaluate(&window("Error List", "VsTextEditPane"), &c),
            (WindowType::ErrorList, ClassificationStrategy::Title)
        );
        assert_eq!(
            chain.evaluate(&window("", "VsTextEditPane"), &c),
            (WindowType::CodeEditor, ClassificationStrategy::ClassName)
        );
        assert_eq!(
            chain.evaluate(&window("", "Whatever"), &c),
            (WindowType::ToolWindow, ClassificationStrategy::Relationship)
        );
        assert_eq!(
            chain.evaluate(&window("", "Whatever"), &ctx(&rules, None)),
            (WindowType::Unknown, ClassificationStrategy::Unresolved)
        );
    }

    #[test]
    fn content_inspector_is_the_last_resort() {
        struct Fixed;
        impl ContentInspector for Fixed {
            fn inspect(&self, _window: &Window) -> Option<WindowType> {
                Some(WindowType::Output)
            }
        }
        let rules = ClassificationRules::builtin().compile().unwrap();
        let mut c = ctx(&rules, None);
        c.inspector = &Fixed;
        let chain = StrategyChain::standard();
        assert_eq!(
            chain.evaluate(&window("", "Whatever"), &c),
            (WindowType::Output, ClassificationStrategy::Content)
        );
        assert_eq!(
            chain.evaluate(&window("Toolbox", "Whatever"), &c),
            (WindowType::Toolbox, ClassificationStrategy::Title)
        );
    }
}
