//! Engine configuration.
//!
//! Every threshold the engine uses lives here. Values are defaults, not
//! requirements: each section deserializes with `#[serde(default)]` so a
//! config file only needs to name the fields it overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Global engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window discovery settings.
    pub discovery: DiscoveryConfig,

    /// Classification settings.
    pub classification: ClassificationConfig,

    /// Layout analysis settings.
    pub layout: LayoutConfig,

    /// Memory pressure thresholds.
    pub memory: MemoryConfig,

    /// Capture limits.
    pub capture: CaptureConfig,

    /// Resource lifecycle settings.
    pub lifecycle: LifecycleConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Window discovery parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Hard timeout for one enumeration pass (milliseconds).
    pub timeout_ms: u64,

    /// Process names (case-insensitive, without extension) that count as the
    /// target application.
    pub target_processes: Vec<String>,

    /// Whether invisible windows are validated and returned.
    pub include_hidden: bool,

    /// Upper bound on concurrent native calls. `None` uses available parallelism.
    pub max_concurrency: Option<usize>,
}

/// Classification parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// How long a cached classification stays valid (seconds).
    pub cache_ttl_secs: u64,

    /// Time budget for a single title pattern evaluation (milliseconds).
    pub pattern_budget_ms: u64,

    /// Titles are truncated to this many characters before matching.
    pub max_title_chars: usize,

    /// Optional JSON file replacing the built-in rule tables.
    pub rules_file: Option<PathBuf>,
}

/// Layout analysis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Edge alignment tolerance for docking detection (pixels).
    pub dock_tolerance_px: i32,
}

/// Memory pressure thresholds, evaluated against projected process usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Projected usage above this is `Warning`.
    pub warning_bytes: u64,

    /// Projected usage above this is `Critical`.
    pub critical_bytes: u64,

    /// Projected usage above this is `Emergency` (rejected).
    pub emergency_bytes: u64,

    /// `Normal` is downgraded to `Warning` below this fraction of available
    /// system memory.
    pub min_available_fraction: f64,

    /// Background sampler interval (milliseconds).
    pub sample_interval_ms: u64,

    /// Number of snapshots kept in the rolling window.
    pub history_len: usize,

    /// Number of most recent snapshots inspected for trend analysis.
    pub trend_window: usize,

    /// Average growth per sample that counts as "rapid" (bytes).
    pub trend_growth_bytes_per_sample: u64,
}

/// Capture limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Timeout for a single-window capture (milliseconds).
    pub single_timeout_ms: u64,

    /// Absolute ceiling for one capture's estimated size (bytes).
    pub hard_ceiling_bytes: u64,

    /// Bytes per pixel used for size estimation.
    pub bytes_per_pixel: u64,

    /// Downscale encoded output when the allocator reports `Warning`.
    pub downscale_on_warning: bool,
}

/// Resource lifecycle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Interval of the expired-lease sweep (seconds).
    pub sweep_interval_secs: u64,

    /// Leases idle longer than this are released under high memory pressure (seconds).
    pub idle_threshold_secs: u64,

    /// Max lifetime applied to leases acquired without one (seconds).
    pub default_max_lifetime_secs: Option<u64>,

    /// Maximum number of idle objects kept per pool.
    pub max_pool_size: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "idelens=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            target_processes: vec!["devenv".to_string()],
            include_hidden: false,
            max_concurrency: None,
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            pattern_budget_ms: 1_000,
            max_title_chars: 512,
            rules_file: None,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            dock_tolerance_px: 20,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            warning_bytes: 500 * MIB,
            critical_bytes: 1024 * MIB,
            emergency_bytes: 1536 * MIB,
            min_available_fraction: 0.10,
            sample_interval_ms: 5_000,
            history_len: 12,
            trend_window: 5,
            trend_growth_bytes_per_sample: 32 * MIB,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            single_timeout_ms: 45_000,
            hard_ceiling_bytes: 130 * MIB,
            bytes_per_pixel: 4,
            downscale_on_warning: true,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            idle_threshold_secs: 300,
            default_max_lifetime_secs: None,
            max_pool_size: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ClassificationConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn pattern_budget(&self) -> Duration {
        Duration::from_millis(self.pattern_budget_ms)
    }
}

impl MemoryConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl CaptureConfig {
    pub fn single_timeout(&self) -> Duration {
        Duration::from_millis(self.single_timeout_ms)
    }
}

impl LifecycleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn default_max_lifetime(&self) -> Option<Duration> {
        self.default_max_lifetime_secs.map(Duration::from_secs)
    }
}

impl EngineConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &std::path::Path) -> crate::IdelensResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject threshold sets that cannot be evaluated in order.
    pub fn validate(&self) -> crate::IdelensResult<()> {
        let m = &self.memory;
        if !(m.warning_bytes < m.critical_bytes && m.critical_bytes < m.emergency_bytes) {
            return Err(crate::IdelensError::config(format!(
                "memory thresholds must be strictly increasing (warning {} < critical {} < emergency {})",
                m.warning_bytes, m.critical_bytes, m.emergency_bytes
            )));
        }
        if !(0.0..=1.0).contains(&m.min_available_fraction) {
            return Err(crate::IdelensError::config(
                "memory.min_available_fraction must be within [0, 1]",
            ));
        }
        if self.layout.dock_tolerance_px < 0 {
            return Err(crate::IdelensError::config(
                "layout.dock_tolerance_px must not be negative",
            ));
        }
        if self.capture.bytes_per_pixel == 0 {
            return Err(crate::IdelensError::config(
                "capture.bytes_per_pixel must be positive",
            ));
        }
        Ok(())
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("idelens").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{ "layout": { "dock_tolerance_px": 8 }, "memory": { "warning_bytes": 1 } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.layout.dock_tolerance_px, 8);
        assert_eq!(config.memory.warning_bytes, 1);
        assert_eq!(config.memory.critical_bytes, 1024 * MIB);
        assert_eq!(config.discovery.timeout_ms, 30_000);
        assert_eq!(config.classification.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn unordered_memory_thresholds_are_rejected() {
        let mut config = EngineConfig::default();
        config.memory.critical_bytes = config.memory.emergency_bytes;
        assert!(config.validate().is_err());
    }
}
