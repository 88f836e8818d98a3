//! Autoscaling signals.
//!
//! Utilization is `total_connections / Σ max_connections` over healthy
//! instances. Above the scale-up threshold a scale-up signal is emitted;
//! below the scale-down threshold a scale-down signal is emitted, but only
//! while more than the minimum number of instances are healthy.

use serde::Serialize;
use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::config::FailoverConfig;
use crate::load_balancer::pool::InstanceRegistry;
use crate::observability::events::{EventBus, LoadBalancerEvent};
use crate::observability::metrics::MetricsSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingDirection {
    Up,
    Down,
}

impl ScalingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingDirection::Up => "up",
            ScalingDirection::Down => "down",
        }
    }
}

pub struct ScalingEvaluator {
    registry: Arc<InstanceRegistry>,
    admission: Arc<AdmissionController>,
    events: EventBus,
    metrics: Arc<dyn MetricsSink>,
    failover: FailoverConfig,
}

impl ScalingEvaluator {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        admission: Arc<AdmissionController>,
        events: EventBus,
        metrics: Arc<dyn MetricsSink>,
        failover: FailoverConfig,
    ) -> Self {
        Self {
            registry,
            admission,
            events,
            metrics,
            failover,
        }
    }

    /// Run one evaluation. Returns the signal emitted, if any.
    pub fn evaluate(&self) -> Option<ScalingDirection> {
        if !self.failover.auto_scaling {
            return None;
        }

        let capacity = self.registry.healthy_capacity();
        if capacity == 0 {
            return None;
        }
        let utilization = self.admission.total_connections() as f64 / capacity as f64;

        let direction = if utilization > self.failover.scale_up_threshold {
            tracing::info!(
                utilization,
                threshold = self.failover.scale_up_threshold,
                "Utilization above threshold, scale up"
            );
            self.events.emit(LoadBalancerEvent::ScaleUpTriggered {
                utilization,
                threshold: self.failover.scale_up_threshold,
            });
            ScalingDirection::Up
        } else if utilization < self.failover.scale_down_threshold
            && self.registry.healthy_count() > self.failover.min_healthy_instances
        {
            tracing::info!(
                utilization,
                threshold = self.failover.scale_down_threshold,
                "Utilization below threshold, scale down"
            );
            self.events.emit(LoadBalancerEvent::ScaleDownTriggered {
                utilization,
                threshold: self.failover.scale_down_threshold,
            });
            ScalingDirection::Down
        } else {
            return None;
        };

        self.metrics.increment_counter(
            "lb_scaling_signals_total",
            &[("direction", direction.as_str().to_string())],
        );
        Some(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstanceDescriptor, LoadBalancerConfig};
    use crate::health::state::HealthTracker;
    use crate::load_balancer::instance::ServiceInstance;
    use crate::load_balancer::SelectionContext;
    use crate::observability::events::EventKind;
    use crate::observability::metrics::NoopMetrics;

    fn setup(instances: u16, max: usize, failover: FailoverConfig) -> (ScalingEvaluator, Arc<AdmissionController>, EventBus) {
        let mut config = LoadBalancerConfig::default();
        config.failover = failover.clone();

        let registry = Arc::new(InstanceRegistry::new());
        for n in 0..instances {
            let desc = InstanceDescriptor::new("127.0.0.1", 9100 + n).with_max_connections(max);
            registry.insert(Arc::new(ServiceInstance::new(desc, max)));
        }
        let events = EventBus::default();
        let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);
        let health = Arc::new(HealthTracker::new(registry.clone(), events.clone(), metrics.clone(), failover.clone()));
        let admission = Arc::new(AdmissionController::new(&config, registry.clone(), health, metrics.clone()));
        let evaluator = ScalingEvaluator::new(registry, admission.clone(), events.clone(), metrics, failover);
        (evaluator, admission, events)
    }

    fn auto(min: usize) -> FailoverConfig {
        FailoverConfig {
            auto_scaling: true,
            min_healthy_instances: min,
            ..FailoverConfig::default()
        }
    }

    #[tokio::test]
    async fn test_scale_up_above_threshold() {
        let (evaluator, admission, events) = setup(2, 5, auto(1));
        let mut rx = events.subscribe();
        for _ in 0..9 {
            admission.next_instance(SelectionContext::new()).await.unwrap();
        }

        assert_eq!(evaluator.evaluate(), Some(ScalingDirection::Up));
        assert_eq!(rx.try_recv().unwrap().kind(), EventKind::ScaleUpTriggered);
    }

    #[test]
    fn test_scale_down_requires_spare_instances() {
        let (evaluator, _, _) = setup(2, 5, auto(1));
        assert_eq!(evaluator.evaluate(), Some(ScalingDirection::Down));

        let (evaluator, _, _) = setup(2, 5, auto(2));
        assert_eq!(evaluator.evaluate(), None);
    }

    #[tokio::test]
    async fn test_no_signal_in_band() {
        let (evaluator, admission, _) = setup(2, 5, auto(1));
        for _ in 0..5 {
            admission.next_instance(SelectionContext::new()).await.unwrap();
        }
        assert_eq!(evaluator.evaluate(), None);
    }

    #[test]
    fn test_disabled_or_no_capacity() {
        let (evaluator, _, _) = setup(2, 5, FailoverConfig::default());
        assert_eq!(evaluator.evaluate(), None);

        let (evaluator, _, _) = setup(0, 5, auto(0));
        assert_eq!(evaluator.evaluate(), None);
    }
}
