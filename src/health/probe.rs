//! Health probe executors.
//!
//! # Responsibilities
//! - Define the probe interface the health checker drives
//! - Provide HTTP and TCP probes for the binary
//!
//! # Design Decisions
//! - Probes do not enforce their own deadline; the checker wraps each
//!   attempt in `tokio::time::timeout`
//! - Every failure is a `ProbeError`, never a panic

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::load_balancer::instance::InstanceSnapshot;

/// Errors raised by a health probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid probe url: {0}")]
    Url(#[from] url::ParseError),

    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// Asynchronously decides whether an instance is healthy.
///
/// `Ok(false)` means the instance answered but is unhealthy; `Err` means
/// the probe itself failed. Both count as a failed check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, instance: &InstanceSnapshot) -> Result<bool, ProbeError>;
}

/// GETs a path on the instance and checks the status code.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    path: String,
    expected_status: Option<u16>,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>, expected_status: Option<u16>) -> Self {
        // Instances are probed directly, never through a system proxy.
        let client = reqwest::Client::builder().no_proxy().build().unwrap_or_default();
        Self {
            client,
            path: path.into(),
            expected_status,
        }
    }

    fn status_ok(&self, status: u16) -> bool {
        match self.expected_status {
            Some(expected) => status == expected,
            None => (200..300).contains(&status),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, instance: &InstanceSnapshot) -> Result<bool, ProbeError> {
        let url = instance.base_url()?.join(&self.path)?;
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, "service-balancer-health-check")
            .send()
            .await?;

        let status = response.status();
        let healthy = self.status_ok(status.as_u16());
        if !healthy {
            tracing::debug!(instance_id = %instance.id, status = %status, "Health check failed: unexpected status");
        }
        Ok(healthy)
    }
}

/// Healthy iff a TCP connection can be opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, instance: &InstanceSnapshot) -> Result<bool, ProbeError> {
        TcpStream::connect((instance.host.as_str(), instance.port)).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceDescriptor;
    use crate::load_balancer::instance::ServiceInstance;
    use tokio::net::TcpListener;

    #[test]
    fn test_status_matching() {
        let any_2xx = HttpProbe::new("/health", None);
        assert!(any_2xx.status_ok(200));
        assert!(any_2xx.status_ok(204));
        assert!(!any_2xx.status_ok(503));

        let exact = HttpProbe::new("/health", Some(204));
        assert!(exact.status_ok(204));
        assert!(!exact.status_ok(200));
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let up = ServiceInstance::new(InstanceDescriptor::new("127.0.0.1", port), 1).snapshot();
        assert!(TcpProbe.probe(&up).await.unwrap());

        drop(listener);
        let down = ServiceInstance::new(InstanceDescriptor::new("127.0.0.1", port), 1).snapshot();
        assert!(matches!(TcpProbe.probe(&down).await, Err(ProbeError::Connect(_))));
    }
}
