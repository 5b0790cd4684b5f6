//! IdeLens Classification
//!
//! Assigns a semantic [`WindowType`](idelens_window_model::WindowType) to
//! each discovered window. Four strategies run in a fixed order and the
//! first definite answer wins:
//!
//! 1. title patterns (case-insensitive regexes, each under a time budget)
//! 2. class-name sets
//! 3. the parent's resolved type
//! 4. a pluggable content inspector, a no-op unless one is installed
//!
//! Results are cached per window handle for a fixed TTL.

pub mod cache;
pub mod classifier;
pub mod rules;
pub mod strategy;

pub use cache::ClassificationCache;
pub use classifier::Classifier;
pub use rules::{ClassRule, ClassificationRules, CompiledRules, TitleRule};
pub use strategy::{ContentInspector, NoContentInspection, StrategyChain};
