//! Controller-specific error types.
//!
//! Errors that cross the reconcile loop boundary. Configuration errors
//! produced by the builder never surface here: they are reported as
//! conditions and the reconcile completes.

use kube::Error as KubeError;
use lb_client::ClientError;
use thiserror::Error;

/// Errors that can occur in the load-balancer controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Error from the API seam
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A handler asked for the trigger to be retried
    #[error("Handler requested retry: {0}")]
    HandlerRetry(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Admission webhook server failure
    #[error("Webhook server error: {0}")]
    Webhook(String),
}
