//! Admission-path error types.

use thiserror::Error;

/// Errors returned by the load balancer's public operations.
///
/// These are explicit failures on the admission path; nothing here is ever
/// raised as a panic across the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadBalancerError {
    /// The healthy set is empty.
    #[error("no healthy instances available")]
    NoHealthyInstances,

    /// The admission queue is at capacity.
    #[error("admission queue is full")]
    QueueFull,

    /// A queued request was not admitted within its wait bound.
    #[error("queued request timed out")]
    QueueTimeout,

    /// The request arrived during or after shutdown.
    #[error("load balancer is shutting down")]
    ServiceShuttingDown,

    /// The instance descriptor was rejected at registration.
    #[error("invalid instance: {0}")]
    InvalidInstance(String),
}

/// Result type for load balancer operations.
pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;
