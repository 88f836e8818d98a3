//! Typed lifecycle events.
//!
//! Events fan out over a `tokio::sync::broadcast` channel. Slow subscribers
//! lose the oldest events (`RecvError::Lagged`) rather than stalling the
//! balancer.

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::load_balancer::instance::InstanceSnapshot;

/// Default capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A lifecycle event emitted by the load balancer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadBalancerEvent {
    InstanceRegistered {
        instance: InstanceSnapshot,
    },
    InstanceUnregistered {
        instance_id: Uuid,
    },
    InstanceHealthy {
        instance_id: Uuid,
    },
    InstanceUnhealthy {
        instance_id: Uuid,
        reason: String,
    },
    EmergencyScalingRequired {
        healthy_instances: usize,
        min_healthy_instances: usize,
    },
    ScaleUpTriggered {
        utilization: f64,
        threshold: f64,
    },
    ScaleDownTriggered {
        utilization: f64,
        threshold: f64,
    },
    FailoverTriggered {
        instance_id: Uuid,
        reason: String,
    },
}

/// The closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InstanceRegistered,
    InstanceUnregistered,
    InstanceHealthy,
    InstanceUnhealthy,
    EmergencyScalingRequired,
    ScaleUpTriggered,
    ScaleDownTriggered,
    FailoverTriggered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::InstanceRegistered => "instance_registered",
            EventKind::InstanceUnregistered => "instance_unregistered",
            EventKind::InstanceHealthy => "instance_healthy",
            EventKind::InstanceUnhealthy => "instance_unhealthy",
            EventKind::EmergencyScalingRequired => "emergency_scaling_required",
            EventKind::ScaleUpTriggered => "scale_up_triggered",
            EventKind::ScaleDownTriggered => "scale_down_triggered",
            EventKind::FailoverTriggered => "failover_triggered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LoadBalancerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LoadBalancerEvent::InstanceRegistered { .. } => EventKind::InstanceRegistered,
            LoadBalancerEvent::InstanceUnregistered { .. } => EventKind::InstanceUnregistered,
            LoadBalancerEvent::InstanceHealthy { .. } => EventKind::InstanceHealthy,
            LoadBalancerEvent::InstanceUnhealthy { .. } => EventKind::InstanceUnhealthy,
            LoadBalancerEvent::EmergencyScalingRequired { .. } => EventKind::EmergencyScalingRequired,
            LoadBalancerEvent::ScaleUpTriggered { .. } => EventKind::ScaleUpTriggered,
            LoadBalancerEvent::ScaleDownTriggered { .. } => EventKind::ScaleDownTriggered,
            LoadBalancerEvent::FailoverTriggered { .. } => EventKind::FailoverTriggered,
        }
    }
}

/// Broadcast bus for [`LoadBalancerEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LoadBalancerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoadBalancerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: LoadBalancerEvent) {
        tracing::debug!(kind = %event.kind(), subscribers = self.tx.receiver_count(), "Emitting event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(LoadBalancerEvent::InstanceHealthy { instance_id: Uuid::nil() });
    }

    #[test]
    fn test_subscribers_receive_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.emit(LoadBalancerEvent::InstanceUnhealthy { instance_id: id, reason: "timeout".into() });
        bus.emit(LoadBalancerEvent::InstanceHealthy { instance_id: id });

        assert_eq!(rx.try_recv().unwrap().kind(), EventKind::InstanceUnhealthy);
        assert_eq!(rx.try_recv().unwrap(), LoadBalancerEvent::InstanceHealthy { instance_id: id });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_serialized_tag() {
        let event = LoadBalancerEvent::ScaleUpTriggered { utilization: 0.9, threshold: 0.8 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "scale_up_triggered");
        assert_eq!(json["threshold"], 0.8);
    }
}
