//! The load balancer handle.
//!
//! # Responsibilities
//! - Wire the registry, health, admission, lifecycle, and observability
//!   subsystems together from one validated configuration
//! - Expose the public operations
//! - Own the background tasks and tear them down at shutdown
//!
//! # Background Tasks
//! ```text
//! start()
//!     → health_checker (health_check.enabled; autoscaling after each cycle)
//!     → queue_drain    (every limits.queue_drain_interval_ms)
//!     → autoscaler     (failover.auto_scaling without health checks)
//!     → monitor        (monitoring.enabled)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::admission::{AdmissionController, ConnectionId, LoadBalancingResult};
use crate::config::validation::{validate_config, validate_instance};
use crate::config::{ConfigError, InstanceDescriptor, LoadBalancerConfig};
use crate::error::{LoadBalancerError, LoadBalancerResult};
use crate::health::{
    HealthChecker, HealthCycleReport, HealthProbe, HealthTracker, HttpProbe, ScalingDirection,
    ScalingEvaluator, TcpProbe,
};
use crate::lifecycle::{DrainCoordinator, DrainOutcome, Shutdown};
use crate::load_balancer::instance::{InstanceSnapshot, ServiceInstance};
use crate::load_balancer::pool::InstanceRegistry;
use crate::load_balancer::SelectionContext;
use crate::observability::events::{EventBus, LoadBalancerEvent, EVENT_CHANNEL_CAPACITY};
use crate::observability::metrics::{MetricsSink, NoopMetrics};
use crate::observability::monitor::{Alert, Monitor};
use crate::observability::stats::LoadBalancerStatistics;

/// Builder for [`LoadBalancer`].
pub struct LoadBalancerBuilder {
    config: LoadBalancerConfig,
    probe: Option<Arc<dyn HealthProbe>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    event_capacity: usize,
}

impl LoadBalancerBuilder {
    /// Health probe to use. Defaults to an HTTP probe when
    /// `health_check.path` is set and a TCP connect probe otherwise.
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Metrics sink. Defaults to discarding everything.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Validate the configuration and assemble the load balancer.
    pub fn build(self) -> Result<LoadBalancer, ConfigError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;

        let config = self.config;
        let probe = self.probe.unwrap_or_else(|| default_probe(&config));
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));
        let events = EventBus::new(self.event_capacity);

        let registry = Arc::new(InstanceRegistry::new());
        let tracker = Arc::new(HealthTracker::new(
            registry.clone(),
            events.clone(),
            metrics.clone(),
            config.failover.clone(),
        ));
        let admission = Arc::new(AdmissionController::new(
            &config,
            registry.clone(),
            tracker.clone(),
            metrics.clone(),
        ));
        let scaling = Arc::new(ScalingEvaluator::new(
            registry.clone(),
            admission.clone(),
            events.clone(),
            metrics.clone(),
            config.failover.clone(),
        ));
        let checker = Arc::new(HealthChecker::new(
            registry.clone(),
            tracker.clone(),
            probe,
            scaling.clone(),
            metrics.clone(),
            config.health_check.clone(),
        ));
        let drain = Arc::new(DrainCoordinator::new(
            registry.clone(),
            tracker.clone(),
            admission.clone(),
            events.clone(),
            config.drain.clone(),
        ));
        let monitor = Arc::new(Monitor::new(
            registry.clone(),
            admission.clone(),
            metrics,
            config.monitoring.clone(),
        ));

        tracing::info!(
            strategy = %config.strategy,
            max_total = config.limits.max_total,
            queue_size = config.limits.queue_size,
            health_checks = config.health_check.enabled,
            auto_scaling = config.failover.auto_scaling,
            "Load balancer initialized"
        );

        Ok(LoadBalancer {
            inner: Arc::new(Inner {
                config,
                registry,
                tracker,
                admission,
                scaling,
                checker,
                drain,
                monitor,
                events,
                shutdown: Shutdown::new(),
                started: AtomicBool::new(false),
            }),
        })
    }
}

fn default_probe(config: &LoadBalancerConfig) -> Arc<dyn HealthProbe> {
    match &config.health_check.path {
        Some(path) => Arc::new(HttpProbe::new(path.clone(), config.health_check.expected_status)),
        None => Arc::new(TcpProbe),
    }
}

struct Inner {
    config: LoadBalancerConfig,
    registry: Arc<InstanceRegistry>,
    tracker: Arc<HealthTracker>,
    admission: Arc<AdmissionController>,
    scaling: Arc<ScalingEvaluator>,
    checker: Arc<HealthChecker>,
    drain: Arc<DrainCoordinator>,
    monitor: Arc<Monitor>,
    events: EventBus,
    shutdown: Shutdown,
    started: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Background loops only hold subsystem handles; stop them with the last handle.
        self.shutdown.trigger();
    }
}

/// Distributes connections across registered service instances.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct LoadBalancer {
    inner: Arc<Inner>,
}

impl LoadBalancer {
    pub fn builder(config: LoadBalancerConfig) -> LoadBalancerBuilder {
        LoadBalancerBuilder {
            config,
            probe: None,
            metrics: None,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }

    pub fn config(&self) -> &LoadBalancerConfig {
        &self.inner.config
    }

    /// Spawn the background tasks. Calling it again has no effect.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.shutdown.is_triggered() {
            tracing::warn!("start called after shutdown, ignoring");
            return;
        }
        if inner.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let config = &inner.config;

        if config.health_check.enabled {
            let checker = inner.checker.clone();
            inner.shutdown.spawn("health_checker", move |rx| checker.run(rx));
        }

        let admission = inner.admission.clone();
        let drain_every = config.limits.queue_drain_interval();
        inner.shutdown.spawn("queue_drain", move |rx| {
            periodic(drain_every, rx, move || admission.drain_queue())
        });

        if config.failover.auto_scaling && !config.health_check.enabled {
            let scaling = inner.scaling.clone();
            let evaluate_every = config.health_check.interval();
            inner.shutdown.spawn("autoscaler", move |rx| {
                periodic(evaluate_every, rx, move || {
                    scaling.evaluate();
                })
            });
        }

        if config.monitoring.enabled {
            let monitor = inner.monitor.clone();
            inner.shutdown.spawn("monitor", move |rx| monitor.run(rx));
        }

        tracing::info!("Load balancer started");
    }

    /// Register an instance. It starts healthy with zeroed counters.
    pub fn register(&self, descriptor: InstanceDescriptor) -> LoadBalancerResult<Uuid> {
        let inner = &self.inner;
        if inner.shutdown.is_triggered() {
            return Err(LoadBalancerError::ServiceShuttingDown);
        }

        let problems = validate_instance(&descriptor);
        if !problems.is_empty() {
            return Err(LoadBalancerError::InvalidInstance(problems.join("; ")));
        }

        let instance = Arc::new(ServiceInstance::new(descriptor, inner.config.limits.max_per_instance));
        let id = instance.id;
        let snapshot = instance.snapshot();
        inner.registry.insert(instance);

        tracing::info!(
            instance_id = %id,
            addr = %format!("{}:{}", snapshot.host, snapshot.port),
            weight = snapshot.weight,
            max_connections = snapshot.max_connections,
            "Instance registered"
        );
        inner.events.emit(LoadBalancerEvent::InstanceRegistered { instance: snapshot });
        inner.tracker.rearm();
        // New capacity may satisfy queued requests.
        inner.admission.drain_queue();
        Ok(id)
    }

    /// Drain and remove an instance. Returns false for an unknown id.
    pub async fn unregister(&self, instance_id: Uuid) -> bool {
        let inner = &self.inner;
        if inner.drain.drain(instance_id).await.is_none() {
            return false;
        }

        match inner.registry.remove(instance_id) {
            Some(instance) => {
                tracing::info!(instance_id = %instance_id, addr = %instance.address(), "Instance unregistered");
                inner.events.emit(LoadBalancerEvent::InstanceUnregistered { instance_id });
                true
            }
            // Removed by a concurrent unregister while we were draining.
            None => false,
        }
    }

    pub fn list_instances(&self) -> Vec<InstanceSnapshot> {
        self.inner.registry.snapshot()
    }

    pub fn instance(&self, instance_id: Uuid) -> Option<InstanceSnapshot> {
        self.inner.registry.get(instance_id).map(|i| i.snapshot())
    }

    /// Pick an instance for a new connection, waiting in the admission
    /// queue while every instance is at capacity.
    pub async fn get_next_instance(&self, context: SelectionContext) -> LoadBalancerResult<LoadBalancingResult> {
        self.inner.admission.next_instance(context).await
    }

    /// Release a connection obtained from [`get_next_instance`](Self::get_next_instance).
    /// Returns false for an unknown instance.
    pub fn release_connection(&self, connection_id: &ConnectionId, instance_id: Uuid, success: bool) -> bool {
        self.inner.admission.release(connection_id, instance_id, success)
    }

    /// Stop new traffic to an instance and wait for it to empty. `None` for
    /// an unknown id.
    pub async fn drain(&self, instance_id: Uuid) -> Option<DrainOutcome> {
        self.inner.drain.drain(instance_id).await
    }

    pub async fn trigger_failover(&self, instance_id: Uuid, reason: &str) -> bool {
        self.inner.drain.failover(instance_id, reason).await
    }

    /// Run one health-check cycle now.
    pub async fn run_health_checks(&self) -> HealthCycleReport {
        self.inner.checker.check_all().await
    }

    pub fn evaluate_scaling(&self) -> Option<ScalingDirection> {
        self.inner.scaling.evaluate()
    }

    pub fn check_alerts(&self) -> Vec<Alert> {
        self.inner.monitor.check()
    }

    pub fn statistics(&self) -> LoadBalancerStatistics {
        LoadBalancerStatistics::collect(&self.inner.registry, &self.inner.admission)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoadBalancerEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }

    /// Stop admitting, reject queued requests, stop background tasks, and
    /// drain every instance. Only the first call does any work.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if !inner.shutdown.trigger() {
            return;
        }

        tracing::info!("Load balancer shutting down");
        // Refuse new work before waiting on a health cycle that may be mid-probe.
        inner.admission.close();
        inner.shutdown.join().await;
        let outcomes = inner.drain.drain_all().await;
        let forced = outcomes
            .iter()
            .filter(|o| matches!(o, DrainOutcome::Forced { .. }))
            .count();
        tracing::info!(instances = outcomes.len(), forced, "Shutdown complete");
    }
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("strategy", &self.inner.config.strategy)
            .field("instances", &self.inner.registry.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

async fn periodic<F>(every: Duration, mut shutdown: broadcast::Receiver<()>, mut tick: F)
where
    F: FnMut() + Send,
{
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => tick(),
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strategy;

    fn quiet_config() -> LoadBalancerConfig {
        let mut config = LoadBalancerConfig::default();
        config.health_check.enabled = false;
        config.monitoring.enabled = false;
        config
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = quiet_config();
        config.limits.max_total = 0;
        assert!(matches!(
            LoadBalancer::builder(config).build(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_register_validates_descriptor() {
        let lb = LoadBalancer::builder(quiet_config()).build().unwrap();
        let err = lb
            .register(InstanceDescriptor::new("", 8080).with_weight(0.0))
            .unwrap_err();
        assert!(matches!(err, LoadBalancerError::InvalidInstance(msg) if msg.contains("host") && msg.contains("weight")));
        assert!(lb.list_instances().is_empty());
    }

    #[tokio::test]
    async fn test_register_uses_default_max_connections() {
        let mut config = quiet_config();
        config.strategy = Strategy::LeastConnections;
        config.limits.max_per_instance = 7;
        let lb = LoadBalancer::builder(config).build().unwrap();

        let id = lb.register(InstanceDescriptor::new("127.0.0.1", 8080)).unwrap();
        assert_eq!(lb.instance(id).unwrap().max_connections, 7);

        let result = lb.get_next_instance(SelectionContext::new()).await.unwrap();
        assert_eq!(result.decision.strategy, Strategy::LeastConnections);
        assert!(lb.release_connection(&result.connection_id, id, true));
    }

    #[tokio::test]
    async fn test_start_and_shutdown_are_idempotent() {
        let mut config = LoadBalancerConfig::default();
        config.health_check.path = Some("/health".into());
        let lb = LoadBalancer::builder(config).build().unwrap();

        lb.start();
        lb.start();
        lb.shutdown().await;
        lb.shutdown().await;

        assert!(lb.is_shutting_down());
        assert_eq!(
            lb.register(InstanceDescriptor::new("127.0.0.1", 8080)).unwrap_err(),
            LoadBalancerError::ServiceShuttingDown
        );
    }
}
