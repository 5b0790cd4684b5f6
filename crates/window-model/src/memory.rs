//! Memory pressure levels and allocation assessments.

use serde::{Deserialize, Serialize};

/// Coarse danger level of current or projected memory usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl RiskLevel {
    /// Levels at which idle resources are released proactively.
    pub fn is_high(&self) -> bool {
        *self >= RiskLevel::Critical
    }

    /// The action mandated for an allocation at this level.
    pub fn action(&self) -> RecommendedAction {
        match self {
            RiskLevel::Normal => RecommendedAction::Proceed,
            RiskLevel::Warning => RecommendedAction::ProceedWithCaution,
            RiskLevel::Critical => RecommendedAction::RequireOptimization,
            RiskLevel::Emergency => RecommendedAction::Reject,
        }
    }
}

/// What the caller should do with a prospective allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Proceed,
    ProceedWithCaution,
    /// Force a cleanup pass before retrying.
    RequireOptimization,
    Reject,
}

/// Assessment of one prospective allocation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryAllocationAssessment {
    pub requested_bytes: u64,
    pub current_bytes: u64,
    pub projected_bytes: u64,
    pub available_system_bytes: u64,
    pub risk_level: RiskLevel,
    pub action: RecommendedAction,
    pub allow_allocation: bool,
    /// Why the allocation is being made, e.g. "capture 0x1a2b".
    pub context: String,
    pub guidance: String,
}

/// A transition of the monitor's pressure level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureChange {
    pub previous: RiskLevel,
    pub current: RiskLevel,
    pub process_bytes: u64,
}

/// Format a byte count as mebibytes with one decimal.
pub fn format_mib(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}
