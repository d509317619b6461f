use tempo_core::ConfigError;
use thiserror::Error;

/// Reasons a run stops before (or instead of) producing statistics.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid scenario configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid workload: {0}")]
    Workload(#[from] WorkloadError),

    #[error("Setup phase failed; aborting run: {0}")]
    Setup(#[from] SetupError),
}

#[derive(Debug, Error, PartialEq)]
pub enum WorkloadError {
    #[error("No variants configured")]
    Empty,

    #[error("Variant '{metric}' has an invalid weight {weight}; weights must be finite and non-negative")]
    InvalidWeight { metric: String, weight: f64 },

    #[error("Variant weights sum to zero")]
    ZeroTotalWeight,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Setup request failed: {0}")]
    Request(String),

    #[error("Setup request returned status {0}")]
    Status(u16),

    #[error("Setup response is not valid JSON: {0}")]
    Body(#[from] serde_json::Error),

    #[error("Setup response is not a JSON object")]
    NotAnObject,

    #[error("Setup response has no usable '{0}' field")]
    MissingField(String),
}
