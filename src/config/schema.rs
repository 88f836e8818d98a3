//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the load
//! balancer. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Instance selection strategy.
    pub strategy: Strategy,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Failover and autoscaling settings.
    pub failover: FailoverConfig,

    /// Connection limits and admission queue.
    pub limits: ConnectionLimits,

    /// Drain timing.
    pub drain: DrainConfig,

    /// Monitoring and alert thresholds.
    pub monitoring: MonitoringConfig,

    /// Logging and metrics export.
    pub observability: ObservabilityConfig,

    /// Instances registered at startup.
    pub instances: Vec<InstanceDescriptor>,
}

/// Instance selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    IpHash,
    Random,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::WeightedRoundRobin => "weighted_round_robin",
            Strategy::LeastConnections => "least_connections",
            Strategy::IpHash => "ip_hash",
            Strategy::Random => "random",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire protocol spoken by an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
    Tcp,
}

impl Protocol {
    /// URL scheme used when probing the instance.
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
        }
    }
}

/// Description of a backend instance, supplied at registration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InstanceDescriptor {
    /// Hostname or IP address.
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Protocol (default: http).
    #[serde(default)]
    pub protocol: Protocol,

    /// Weight for weighted selection (default: 1.0).
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Per-instance connection cap. Falls back to `limits.max_per_instance`.
    #[serde(default)]
    pub max_connections: Option<usize>,

    /// Opaque metadata carried alongside the instance.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl InstanceDescriptor {
    /// Create a descriptor with default protocol, weight, and limits.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::default(),
            weight: default_weight(),
            max_connections: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Timeout for a single probe attempt in seconds.
    pub timeout_secs: u64,

    /// Re-probes after a failed attempt before declaring the instance unhealthy.
    pub retries: u32,

    /// Base delay for backoff between retries in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for backoff between retries in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Path to probe for HTTP health checks.
    pub path: Option<String>,

    /// Status code a healthy instance must answer with. Any 2xx when unset.
    pub expected_status: Option<u16>,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            retries: 2,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 1000,
            path: None,
            expected_status: None,
        }
    }
}

/// Failover and autoscaling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Enable emergency scaling signals.
    pub enabled: bool,

    /// Healthy instance count below which emergency scaling is requested.
    pub min_healthy_instances: usize,

    /// Enable utilization-based scale up/down signals.
    pub auto_scaling: bool,

    /// Utilization above which a scale up is signalled.
    pub scale_up_threshold: f64,

    /// Utilization below which a scale down is signalled.
    pub scale_down_threshold: f64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_healthy_instances: 1,
            auto_scaling: false,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
        }
    }
}

/// Connection limits and admission queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionLimits {
    /// Default connection cap for instances that do not set one.
    pub max_per_instance: usize,

    /// Global connection cap across all instances.
    pub max_total: usize,

    /// Maximum number of requests waiting for capacity.
    pub queue_size: usize,

    /// How long a queued request may wait, in seconds.
    pub queue_timeout_secs: u64,

    /// Period of the queue drain tick in milliseconds.
    pub queue_drain_interval_ms: u64,
}

impl ConnectionLimits {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    pub fn queue_drain_interval(&self) -> Duration {
        Duration::from_millis(self.queue_drain_interval_ms)
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_per_instance: 100,
            max_total: 1000,
            queue_size: 100,
            queue_timeout_secs: 30,
            queue_drain_interval_ms: 1000,
        }
    }
}

/// Drain timing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Upper bound on waiting for connections to finish, in seconds.
    pub timeout_secs: u64,

    /// Polling period while waiting, in milliseconds.
    pub poll_interval_ms: u64,
}

impl DrainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_ms: 1000,
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Enable the periodic monitoring task.
    pub enabled: bool,

    /// Evaluation interval in seconds.
    pub interval_secs: u64,

    /// Alert thresholds.
    pub alert_thresholds: AlertThresholds,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

/// Thresholds above which alerts are raised.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Error rate (0.0 - 1.0). Also the per-instance error rate that marks
    /// an instance unhealthy on release.
    pub error_rate: f64,

    /// Average response time in milliseconds.
    pub response_time_ms: u64,

    /// Utilization of healthy capacity (0.0 - 1.0).
    pub utilization: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            error_rate: 0.05,
            response_time_ms: 1000,
            utilization: 0.9,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
