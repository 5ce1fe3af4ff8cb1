//! Controller-specific error types.
//!
//! One taxonomy for the whole engine: exhaustion and dependency-not-ready are
//! retryable and recovered by the next reconciliation pass; configuration
//! errors stay until the user fixes the workload; external-call errors carry
//! the caller's backoff.

use cloud_client::CloudError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the gamenet controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cloud/vendor adapter error
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// No load balancer or port satisfies the request
    #[error("Allocation exhausted: {0}")]
    Exhausted(String),

    /// A resource the next step needs has not reported its identifier yet
    #[error("Dependency not ready: {0}")]
    DependencyNotReady(String),

    /// Malformed workload network configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bitmap and registry disagree; rebuild from cold start instead of
    /// proceeding on corrupt state
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether a later reconciliation pass can succeed without user action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ControllerError::InvalidConfig(_))
    }
}
