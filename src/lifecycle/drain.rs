//! Instance draining and failover.
//!
//! # Responsibilities
//! - Stop new traffic to an instance and wait for its connections to finish
//! - Force the remaining connections closed once the drain bound passes
//! - Fail an instance over with an audit reason
//!
//! Draining is permanent: a drained instance is never probed back to
//! healthy and leaves the registry only through unregister.

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{self, Instant};
use uuid::Uuid;

use crate::admission::AdmissionController;
use crate::config::DrainConfig;
use crate::health::state::HealthTracker;
use crate::load_balancer::instance::ServiceInstance;
use crate::load_balancer::pool::InstanceRegistry;
use crate::observability::events::{EventBus, LoadBalancerEvent};

/// How a drain finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Every connection was released within the bound.
    Completed,
    /// The bound passed and the remaining connections were force closed.
    Forced { dropped: usize },
}

pub struct DrainCoordinator {
    registry: Arc<InstanceRegistry>,
    tracker: Arc<HealthTracker>,
    admission: Arc<AdmissionController>,
    events: EventBus,
    config: DrainConfig,
}

impl DrainCoordinator {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        tracker: Arc<HealthTracker>,
        admission: Arc<AdmissionController>,
        events: EventBus,
        config: DrainConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            admission,
            events,
            config,
        }
    }

    /// Drain a registered instance. `None` for an unknown id.
    pub async fn drain(&self, instance_id: Uuid) -> Option<DrainOutcome> {
        let Some(instance) = self.registry.get(instance_id) else {
            tracing::debug!(%instance_id, "Drain requested for unknown instance");
            return None;
        };
        Some(self.drain_instance(&instance).await)
    }

    pub async fn drain_instance(&self, instance: &ServiceInstance) -> DrainOutcome {
        instance.set_draining();
        self.tracker.mark_unhealthy(instance, "draining");

        tracing::info!(
            instance_id = %instance.id,
            addr = %instance.address(),
            connections = instance.connections(),
            "Draining instance"
        );

        let started = Instant::now();
        let deadline = started + self.config.timeout();
        while instance.connections() > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            time::sleep(self.config.poll_interval().min(deadline - now)).await;
        }

        let dropped = self.admission.force_close(instance);
        let outcome = if dropped == 0 {
            DrainOutcome::Completed
        } else {
            DrainOutcome::Forced { dropped }
        };

        tracing::info!(
            instance_id = %instance.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            outcome = ?outcome,
            "Drain finished"
        );
        outcome
    }

    /// Drain every registered instance concurrently.
    pub async fn drain_all(&self) -> Vec<DrainOutcome> {
        let instances = self.registry.all();
        join_all(instances.iter().map(|i| self.drain_instance(i))).await
    }

    /// Take an instance out of rotation with an audit reason, then drain it.
    /// Returns false for an unknown id.
    pub async fn failover(&self, instance_id: Uuid, reason: &str) -> bool {
        let Some(instance) = self.registry.get(instance_id) else {
            tracing::debug!(%instance_id, "Failover requested for unknown instance");
            return false;
        };

        instance.set_draining();
        self.tracker
            .mark_unhealthy(&instance, format!("failover: {reason}"));
        tracing::warn!(
            instance_id = %instance.id,
            addr = %instance.address(),
            reason,
            "Failover triggered"
        );
        self.events.emit(LoadBalancerEvent::FailoverTriggered {
            instance_id,
            reason: reason.to_string(),
        });

        self.drain_instance(&instance).await;
        true
    }
}
