//! Per-window process validation results.

use serde::{Deserialize, Serialize};

use idelens_platform_core::ProcessId;

/// Why validation could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    #[default]
    None,
    ProcessNotFound,
    Terminated,
    AccessDenied,
    UnexpectedError,
}

/// Validation of the process owning one window. Computed fresh for every
/// window in every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessValidation {
    pub process_id: ProcessId,
    /// Resolved executable name; empty when resolution failed.
    pub name: String,
    pub is_target_application: bool,
    pub has_required_access: bool,
    pub is_responding: bool,
    pub failure: ValidationFailure,
}

impl ProcessValidation {
    /// A validation that failed before the process could be described.
    pub fn failed(process_id: ProcessId, failure: ValidationFailure) -> Self {
        Self {
            process_id,
            name: String::new(),
            is_target_application: false,
            has_required_access: failure != ValidationFailure::AccessDenied
                && failure != ValidationFailure::UnexpectedError,
            is_responding: false,
            failure,
        }
    }

    /// The window is kept only when all three flags hold.
    pub fn is_accepted(&self) -> bool {
        self.failure == ValidationFailure::None
            && self.is_target_application
            && self.has_required_access
            && self.is_responding
    }
}
