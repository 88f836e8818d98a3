//! Point-in-time statistics, computed on demand.

use serde::Serialize;

use crate::admission::AdmissionController;
use crate::load_balancer::pool::InstanceRegistry;

/// Aggregate view of the load balancer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadBalancerStatistics {
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub total_connections: usize,
    pub queue_size: usize,
    /// Mean last probe latency across all instances; 0 with no instances.
    pub average_response_time_ms: f64,
    /// `errors / (errors + connections)`; 0 with no traffic.
    pub error_rate: f64,
    /// `connections / Σ max_connections` over healthy instances; 0 with no
    /// healthy capacity.
    pub utilization: f64,
}

impl LoadBalancerStatistics {
    pub fn collect(registry: &InstanceRegistry, admission: &AdmissionController) -> Self {
        let instances = registry.all();
        let total_connections = admission.total_connections();

        let average_response_time_ms = if instances.is_empty() {
            0.0
        } else {
            let sum: f64 = instances
                .iter()
                .map(|i| i.response_time().as_secs_f64() * 1000.0)
                .sum();
            sum / instances.len() as f64
        };

        let total_errors: u64 = instances.iter().map(|i| i.error_count()).sum();
        let traffic = total_errors + total_connections as u64;
        let error_rate = if traffic == 0 {
            0.0
        } else {
            total_errors as f64 / traffic as f64
        };

        let capacity = registry.healthy_capacity();
        let utilization = if capacity == 0 {
            0.0
        } else {
            total_connections as f64 / capacity as f64
        };

        Self {
            total_instances: instances.len(),
            healthy_instances: instances.iter().filter(|i| i.is_healthy()).count(),
            total_connections,
            queue_size: admission.queue_len(),
            average_response_time_ms,
            error_rate,
            utilization,
        }
    }
}
