//! Instance health state machine.
//!
//! # States
//! - Healthy: instance receives traffic
//! - Unhealthy: instance excluded from selection
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: probe failure, error rate breach, drain, failover
//! Unhealthy → Healthy: probe success (error count halved)
//! ```
//!
//! Every transition goes through [`HealthTracker`] so that events, metrics,
//! and the emergency-scaling check stay consistent regardless of which
//! subsystem caused it.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::FailoverConfig;
use crate::load_balancer::instance::ServiceInstance;
use crate::load_balancer::pool::InstanceRegistry;
use crate::observability::events::{EventBus, LoadBalancerEvent};
use crate::observability::metrics::MetricsSink;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            _ => HealthState::Unhealthy,
        }
    }
}

/// Applies health transitions and the emergency-scaling check.
pub struct HealthTracker {
    registry: Arc<InstanceRegistry>,
    events: EventBus,
    metrics: Arc<dyn MetricsSink>,
    failover: FailoverConfig,
    /// Set while the healthy count sits below the minimum; keeps the
    /// emergency signal edge-triggered.
    emergency_latched: AtomicBool,
}

impl HealthTracker {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        events: EventBus,
        metrics: Arc<dyn MetricsSink>,
        failover: FailoverConfig,
    ) -> Self {
        Self {
            registry,
            events,
            metrics,
            failover,
            emergency_latched: AtomicBool::new(false),
        }
    }

    /// Mark an instance unhealthy. Returns true if this call made the transition.
    pub fn mark_unhealthy(&self, instance: &ServiceInstance, reason: impl Into<String>) -> bool {
        if !instance.transition(HealthState::Healthy, HealthState::Unhealthy) {
            return false;
        }

        let reason = reason.into();
        tracing::warn!(
            instance_id = %instance.id,
            addr = %instance.address(),
            reason = %reason,
            error_count = instance.error_count(),
            "Instance marked unhealthy"
        );
        self.metrics.increment_counter(
            "lb_health_transitions_total",
            &[("state", "unhealthy".to_string())],
        );
        self.events.emit(LoadBalancerEvent::InstanceUnhealthy {
            instance_id: instance.id,
            reason,
        });

        self.check_emergency();
        true
    }

    /// Mark an instance healthy and halve its error count. Returns true if
    /// this call made the transition.
    pub fn mark_healthy(&self, instance: &ServiceInstance) -> bool {
        if !instance.transition(HealthState::Unhealthy, HealthState::Healthy) {
            return false;
        }

        instance.halve_errors();
        tracing::info!(
            instance_id = %instance.id,
            addr = %instance.address(),
            error_count = instance.error_count(),
            "Instance recovered"
        );
        self.metrics.increment_counter(
            "lb_health_transitions_total",
            &[("state", "healthy".to_string())],
        );
        self.events.emit(LoadBalancerEvent::InstanceHealthy { instance_id: instance.id });

        self.rearm();
        true
    }

    /// Clear the emergency latch once the healthy count is back at the minimum.
    pub fn rearm(&self) {
        if self.registry.healthy_count() >= self.failover.min_healthy_instances {
            self.emergency_latched.store(false, Ordering::Release);
        }
    }

    fn check_emergency(&self) {
        if !self.failover.enabled {
            return;
        }

        let healthy = self.registry.healthy_count();
        let min = self.failover.min_healthy_instances;
        if healthy >= min {
            return;
        }

        if self
            .emergency_latched
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::error!(
                healthy_instances = healthy,
                min_healthy_instances = min,
                "Healthy instances below minimum, emergency scaling required"
            );
            self.metrics.increment_counter(
                "lb_scaling_signals_total",
                &[("direction", "emergency".to_string())],
            );
            self.events.emit(LoadBalancerEvent::EmergencyScalingRequired {
                healthy_instances: healthy,
                min_healthy_instances: min,
            });
        }
    }
}
