//! Error types shared across IdeLens crates.
//!
//! Only contract violations and genuine platform faults travel through
//! [`IdelensError`]. Expected outcomes such as a rejected capture or a skipped
//! window are modelled as typed results by the crates that produce them.

/// Top-level error type for IdeLens operations.
#[derive(Debug, thiserror::Error)]
pub enum IdelensError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Resource lifecycle error: {message}")]
    Lifecycle { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Operation timed out after {elapsed_ms}ms: {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using IdelensError.
pub type IdelensResult<T> = Result<T, IdelensError>;

impl IdelensError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether this error is a caller contract violation (never retried).
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}
