//! Capability reporting shared by the platform backends.

use serde::{Deserialize, Serialize};

/// A system capability the engine may need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

impl Capability {
    pub fn new(name: &str, description: &str, available: bool, required: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            available,
            required,
            fix_instructions: None,
        }
    }

    /// Attach a fix hint, shown only when the capability is missing.
    pub fn with_fix(mut self, fix: &str) -> Self {
        if !self.available {
            self.fix_instructions = Some(fix.to_string());
        }
        self
    }
}

/// Render a user-friendly capability report.
pub fn format_capability_report(capabilities: &[Capability]) -> String {
    let mut out = String::from("IdeLens System Capabilities:\n");
    out.push_str(&"-".repeat(60));
    out.push('\n');

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        out.push_str(&format!("  {} {}: {}\n", status, cap.name, cap.description));

        if let Some(ref fix) = cap.fix_instructions {
            out.push_str(&format!("    Fix: {fix}\n"));
        }
    }
    out
}
