use std::time::Duration;

// ============= Capability Errors =============

/// Failure reported by an external structured capability (decomposition or synthesis).
///
/// Each variant has a defined fallback in the core; none of them aborts a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityError {
    /// The capability answered, but the answer did not match the expected shape.
    #[error("schema violation: {0}")]
    Schema(String),

    /// The capability could not be reached or failed while answering.
    #[error("transport error: {0}")]
    Transport(String),

    /// The capability did not answer within its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Could not complete: {0}")]
    Convergence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
