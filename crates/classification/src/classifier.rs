//! The classification entry point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use idelens_common::clock::SharedClock;
use idelens_common::config::ClassificationConfig;
use idelens_common::error::IdelensResult;
use idelens_platform_core::WindowHandle;
use idelens_window_model::{ClassificationResult, ClassifiedWindow, Window, WindowType};

use crate::cache::ClassificationCache;
use crate::rules::{ClassificationRules, CompiledRules};
use crate::strategy::{ClassifyContext, ContentInspector, NoContentInspection, StrategyChain};

/// Classifies windows through the strategy chain, memoizing per handle.
pub struct Classifier {
    rules: CompiledRules,
    chain: StrategyChain,
    cache: Arc<ClassificationCache>,
    inspector: Arc<dyn ContentInspector>,
    config: ClassificationConfig,
    clock: SharedClock,
    evaluations: AtomicU64,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("chain", &self.chain)
            .field("patterns", &self.rules.pattern_count())
            .field("cache", &self.cache)
            .field("evaluations", &self.evaluations())
            .finish()
    }
}

impl Classifier {
    /// Build a classifier from configuration, loading `rules_file` if set.
    pub fn from_config(config: ClassificationConfig, clock: SharedClock) -> IdelensResult<Self> {
        let rules = match &config.rules_file {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading classification rules");
                ClassificationRules::load_from(path)?
            }
            None => ClassificationRules::builtin(),
        };
        let cache = Arc::new(ClassificationCache::new(config.cache_ttl(), clock.clone()));
        Self::new(&rules, config, cache, clock)
    }

    /// Build a classifier over an explicitly owned cache.
    pub fn new(
        rules: &ClassificationRules,
        config: ClassificationConfig,
        cache: Arc<ClassificationCache>,
        clock: SharedClock,
    ) -> IdelensResult<Self> {
        Ok(Self {
            rules: rules.compile()?,
            chain: StrategyChain::standard(),
            cache,
            inspector: Arc::new(NoContentInspection),
            config,
            clock,
            evaluations: AtomicU64::new(0),
        })
    }

    /// Install a content inspector for the last strategy.
    pub fn with_inspector(mut self, inspector: Arc<dyn ContentInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_chain(mut self, chain: StrategyChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    /// How many times the strategy chain has run (cache misses).
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Classify one window. The parent's type, if needed, is read from the
    /// cache.
    pub fn classify(&self, window: &Window) -> ClassificationResult {
        if let Some(hit) = self.cache.get(window.handle) {
            return hit;
        }
        let parent_type = window
            .parent
            .and_then(|p| self.cache.peek(p))
            .map(|r| r.window_type);
        self.evaluate(window, parent_type)
    }

    /// Classify a scan's windows in order and set each window's type.
    ///
    /// Windows arrive parents-first, so a child sees its parent's result
    /// from the same scan.
    pub fn classify_all(&self, windows: Vec<Window>) -> Vec<ClassifiedWindow> {
        let mut resolved: HashMap<WindowHandle, WindowType> = HashMap::with_capacity(windows.len());
        windows
            .into_iter()
            .map(|mut window| {
                let classification = match self.cache.get(window.handle) {
                    Some(hit) => hit,
                    None => {
                        let parent_type = window.parent.and_then(|p| {
                            resolved
                                .get(&p)
                                .copied()
                                .or_else(|| self.cache.peek(p).map(|r| r.window_type))
                        });
                        self.evaluate(&window, parent_type)
                    }
                };
                resolved.insert(window.handle, classification.window_type);
                window.window_type = classification.window_type;
                ClassifiedWindow {
                    window,
                    classification,
                }
            })
            .collect()
    }

    fn evaluate(&self, window: &Window, parent_type: Option<WindowType>) -> ClassificationResult {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let ctx = ClassifyContext {
            rules: &self.rules,
            parent_type,
            inspector: self.inspector.as_ref(),
            pattern_budget: self.config.pattern_budget(),
            max_title_chars: self.config.max_title_chars,
        };
        let (window_type, strategy) = self.chain.evaluate(window, &ctx);
        tracing::trace!(
            window = %window.handle,
            title = %window.title,
            %window_type,
            ?strategy,
            "Classified window"
        );
        let result = ClassificationResult {
            handle: window.handle,
            window_type,
            strategy,
            classified_at: self.clock.wall(),
        };
        self.cache.insert(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use idelens_common::clock::ManualClock;
    use idelens_platform_core::{ProcessId, Rect};
    use idelens_window_model::ClassificationStrategy;
    use proptest::prelude::*;

    use super::*;

    fn classifier(clock: SharedClock) -> Classifier {
        Classifier::from_config(ClassificationConfig::default(), clock).unwrap()
    }

    fn window(handle: u64, parent: Option<u64>, title: &str, class_name: &str) -> Window {
        Window {
            handle: WindowHandle(handle),
            title: title.to_string(),
            class_name: class_name.to_string(),
            process_id: ProcessId(4200),
            visible: true,
            rect: Rect::new(0, 0, 100, 100),
            window_type: WindowType::Unknown,
            parent: parent.map(WindowHandle),
            children: vec![],
        }
    }

    #[test]
    fn cache_hit_skips_the_chain() {
        let clock = ManualClock::shared();
        let classifier = classifier(clock.clone());
        let w = window(1, None, "Output", "GenericPane");

        let first = classifier.classify(&w);
        let second = classifier.classify(&w);
        assert_eq!(first, second);
        assert_eq!(classifier.evaluations(), 1);

        clock.advance(Duration::from_secs(301));
        let third = classifier.classify(&w);
        assert_eq!(third.window_type, WindowType::Output);
        assert_eq!(classifier.evaluations(), 2);
    }

    #[test]
    fn classify_all_resolves_children_from_the_same_scan() {
        let classifier = classifier(ManualClock::shared());
        let windows = vec![
            window(0x1000, None, "Contoso.sln - Microsoft Visual Studio", "HwndWrapper[DefaultDomain;;1]"),
            window(0x1005, Some(0x1000), "Program.cs", "VsTextEditPane"),
            window(0x1006, Some(0x1005), "", "VsEditorSurface"),
            window(0x1007, Some(0x1000), "", "DockHost"),
            window(0x3000, None, "", "Nothing"),
        ];
        let classified = classifier.classify_all(windows);
        let types: Vec<_> = classified
            .iter()
            .map(|c| (c.window.window_type, c.classification.strategy))
            .collect();
        assert_eq!(
            types,
            vec![
                (WindowType::MainWindow, ClassificationStrategy::Title),
                (WindowType::CodeEditor, ClassificationStrategy::Title),
                (WindowType::CodeEditor, ClassificationStrategy::Relationship),
                (WindowType::ToolWindow, ClassificationStrategy::Relationship),
                (WindowType::Unknown, ClassificationStrategy::Unresolved),
            ]
        );
    }

    #[test]
    fn custom_chain_order_decides_the_winner() {
        use crate::strategy::{by_class_name, by_title};

        let chain = StrategyChain::with_links(vec![
            (ClassificationStrategy::ClassName, by_class_name),
            (ClassificationStrategy::Title, by_title),
        ]);
        let classifier = classifier(ManualClock::shared()).with_chain(chain);
        let result = classifier.classify(&window(1, None, "Error List", "VsTextEditPane"));
        assert_eq!(result.window_type, WindowType::CodeEditor);
        assert_eq!(result.strategy, ClassificationStrategy::ClassName);
    }

    #[test]
    fn classify_reads_parent_type_from_cache() {
        let classifier = classifier(ManualClock::shared());
        classifier.classify(&window(1, None, "Error List", "GenericPane"));
        let child = classifier.classify(&window(2, Some(1), "", "Grid"));
        assert_eq!(child.window_type, WindowType::ErrorList);
        assert_eq!(child.strategy, ClassificationStrategy::Relationship);
    }

    #[test]
    fn rules_file_is_honored() {
        let dir = std::env::temp_dir().join(format!("idelens-classifier-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rules.json");
        let rules = ClassificationRules {
            title_rules: vec![crate::rules::TitleRule {
                window_type: WindowType::Output,
                patterns: vec!["^Build Log$".to_string()],
            }],
            class_rules: vec![],
        };
        std::fs::write(&path, serde_json::to_string(&rules).unwrap()).unwrap();
        let config = ClassificationConfig {
            rules_file: Some(path),
            ..ClassificationConfig::default()
        };
        let classifier = Classifier::from_config(config, ManualClock::shared()).unwrap();
        assert_eq!(
            classifier.classify(&window(1, None, "build log", "X")).window_type,
            WindowType::Output
        );
        assert_eq!(
            classifier.classify(&window(2, None, "Toolbox", "X")).window_type,
            WindowType::Unknown
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    fn titled_types() -> impl Strategy<Value = (&'static str, WindowType)> {
        prop::sample::select(vec![
            ("Solution Explorer", WindowType::SolutionExplorer),
            ("Properties", WindowType::Properties),
            ("Error List", WindowType::ErrorList),
            ("Output", WindowType::Output),
            ("Toolbox", WindowType::Toolbox),
            ("Call Stack", WindowType::CallStack),
            ("Breakpoints", WindowType::Breakpoints),
            ("App.xaml", WindowType::XamlDesigner),
            ("Program.cs", WindowType::CodeEditor),
            ("Contoso.sln - Microsoft Visual Studio", WindowType::MainWindow),
        ])
    }

    fn known_classes() -> impl Strategy<Value = (&'static str, WindowType)> {
        prop::sample::select(vec![
            ("VsTextEditPane", WindowType::CodeEditor),
            ("VsEditorPane", WindowType::CodeEditor),
            ("XamlDesignerPane", WindowType::XamlDesigner),
            ("#32770", WindowType::Dialog),
            ("GenericPane", WindowType::ToolWindow),
        ])
    }

    proptest! {
        #[test]
        fn title_match_wins_regardless_of_class(
            (title, expected) in titled_types(),
            class_name in "[A-Za-z#0-9\\[\\];]{0,24}",
        ) {
            let classifier = classifier(ManualClock::shared());
            let result = classifier.classify(&window(1, None, title, &class_name));
            prop_assert_eq!(result.window_type, expected);
            prop_assert_eq!(result.strategy, ClassificationStrategy::Title);
        }

        #[test]
        fn class_match_applies_without_title_match(
            (class_name, expected) in known_classes(),
            title in "[0-9 ]{0,12}",
        ) {
            let classifier = classifier(ManualClock::shared());
            let result = classifier.classify(&window(1, None, &title, class_name));
            prop_assert_eq!(result.window_type, expected);
            prop_assert_eq!(result.strategy, ClassificationStrategy::ClassName);
        }
    }
}
