//! Risk-level derivation and allocation assessment.
//!
//! Everything here is a pure function of configuration, one memory sample
//! and the recent history, so the thresholds can be tested without a probe.

use chrono::{DateTime, Utc};
use idelens_common::config::MemoryConfig;
use idelens_platform_core::MemorySample;
use idelens_window_model::{format_mib, MemoryAllocationAssessment, RiskLevel};
use serde::{Deserialize, Serialize};

/// One entry of the rolling history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub taken_at: DateTime<Utc>,
    pub process_bytes: u64,
    pub available_bytes: u64,
    pub total_bytes: u64,
    pub collections: Option<u64>,
}

impl MemorySnapshot {
    pub fn from_sample(sample: MemorySample, taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            process_bytes: sample.process_bytes,
            available_bytes: sample.available_bytes,
            total_bytes: sample.total_bytes,
            collections: sample.collections,
        }
    }
}

/// Whether the last `window` snapshots grew on every step by at least
/// `min_growth` on average.
pub fn is_rapid_growth(history: &[MemorySnapshot], window: usize, min_growth: u64) -> bool {
    if window < 2 || history.len() < window {
        return false;
    }
    let recent = &history[history.len() - window..];
    let mut total: u64 = 0;
    for pair in recent.windows(2) {
        let (before, after) = (pair[0].process_bytes, pair[1].process_bytes);
        if after <= before {
            return false;
        }
        total = total.saturating_add(after - before);
    }
    total / (window as u64 - 1) >= min_growth
}

/// Why a level was chosen; drives the guidance text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Basis {
    Threshold,
    LowAvailable,
    RapidGrowth,
    Safe,
}

fn derive(config: &MemoryConfig, projected: u64, sample: &MemorySample, rapid_growth: bool) -> (RiskLevel, Basis) {
    if projected > config.emergency_bytes {
        return (RiskLevel::Emergency, Basis::Threshold);
    }
    if projected > config.critical_bytes {
        return (RiskLevel::Critical, Basis::Threshold);
    }
    if projected > config.warning_bytes {
        return (RiskLevel::Warning, Basis::Threshold);
    }
    if sample.total_bytes > 0 && sample.available_fraction() < config.min_available_fraction {
        return (RiskLevel::Warning, Basis::LowAvailable);
    }
    if rapid_growth {
        return (RiskLevel::Warning, Basis::RapidGrowth);
    }
    (RiskLevel::Normal, Basis::Safe)
}

/// Level of current usage with nothing requested.
pub fn derive_level(config: &MemoryConfig, sample: &MemorySample, rapid_growth: bool) -> RiskLevel {
    derive(config, sample.process_bytes, sample, rapid_growth).0
}

/// Assess allocating `requested_bytes` on top of `sample`.
pub fn assess_sample(
    config: &MemoryConfig,
    sample: &MemorySample,
    requested_bytes: u64,
    rapid_growth: bool,
    context: &str,
) -> MemoryAllocationAssessment {
    let current = sample.process_bytes;
    let projected = current.saturating_add(requested_bytes);
    let (risk_level, basis) = derive(config, projected, sample, rapid_growth);

    let guidance = match (risk_level, basis) {
        (RiskLevel::Emergency, _) => format!(
            "Requested {} would raise process memory from {} to {}, above the emergency limit of {}. \
             Reduce the capture region or resolution, or retry after closing other applications.",
            format_mib(requested_bytes),
            format_mib(current),
            format_mib(projected),
            format_mib(config.emergency_bytes),
        ),
        (RiskLevel::Critical, _) => format!(
            "Projected usage {} exceeds the critical threshold of {}. \
             Run a cleanup pass before retrying, or reduce capture resolution.",
            format_mib(projected),
            format_mib(config.critical_bytes),
        ),
        (RiskLevel::Warning, Basis::LowAvailable) => format!(
            "Only {} of system memory is available ({:.0}%). Consider reducing capture resolution.",
            format_mib(sample.available_bytes),
            sample.available_fraction() * 100.0,
        ),
        (RiskLevel::Warning, Basis::RapidGrowth) => format!(
            "Process memory grew rapidly over the last {} samples. Consider reducing capture resolution.",
            config.trend_window,
        ),
        (RiskLevel::Warning, _) => format!(
            "Projected usage {} exceeds the warning threshold of {}. \
             Consider reducing capture resolution or using a compressed format.",
            format_mib(projected),
            format_mib(config.warning_bytes),
        ),
        (RiskLevel::Normal, _) => "Allocation is within safe limits.".to_string(),
    };

    MemoryAllocationAssessment {
        requested_bytes,
        current_bytes: current,
        projected_bytes: projected,
        available_system_bytes: sample.available_bytes,
        risk_level,
        action: risk_level.action(),
        allow_allocation: risk_level != RiskLevel::Emergency,
        context: context.to_string(),
        guidance,
    }
}
