//! Cloud client errors

use thiserror::Error;

/// Errors that can occur when reading or writing external network state.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found where one was required
    #[error("Not found: {0}")]
    NotFound(String),

    /// An object in the cluster is missing fields this system requires
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}
