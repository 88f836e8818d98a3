//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every instance concurrently
//! - Bound each attempt by the configured timeout, retry with backoff
//! - Apply the outcome through the health tracker
//! - Run the autoscaling evaluation after each cycle

use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::autoscale::ScalingEvaluator;
use crate::health::probe::{HealthProbe, ProbeError};
use crate::health::state::HealthTracker;
use crate::load_balancer::instance::{InstanceSnapshot, ServiceInstance};
use crate::load_balancer::pool::InstanceRegistry;
use crate::observability::metrics::MetricsSink;
use crate::resilience::Backoff;

/// Final result of probing one instance (after retries).
#[derive(Debug, Clone, PartialEq)]
enum ProbeOutcome {
    Healthy { latency: Duration },
    Unhealthy { reason: String },
}

/// Summary of one health-check cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCycleReport {
    pub probed: usize,
    pub passed: usize,
    pub failed: usize,
}

pub struct HealthChecker {
    registry: Arc<InstanceRegistry>,
    tracker: Arc<HealthTracker>,
    probe: Arc<dyn HealthProbe>,
    scaling: Arc<ScalingEvaluator>,
    metrics: Arc<dyn MetricsSink>,
    config: HealthCheckConfig,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        tracker: Arc<HealthTracker>,
        probe: Arc<dyn HealthProbe>,
        scaling: Arc<ScalingEvaluator>,
        metrics: Arc<dyn MetricsSink>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            probe,
            scaling,
            metrics,
            config,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            retries = self.config.retries,
            "Health checker starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health checker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every instance once, concurrently, then evaluate autoscaling.
    ///
    /// Draining instances are skipped. A probe that panics counts as a
    /// failed check for its instance only.
    pub async fn check_all(&self) -> HealthCycleReport {
        let mut tasks = JoinSet::new();

        for instance in self.registry.all() {
            if instance.is_draining() {
                continue;
            }
            let probe = self.probe.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let snapshot = instance.snapshot();
                let outcome = AssertUnwindSafe(probe_with_retries(probe, snapshot, config))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| ProbeOutcome::Unhealthy {
                        reason: "probe panicked".to_string(),
                    });
                (instance, outcome)
            });
        }

        let mut report = HealthCycleReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (instance, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(error = %e, "Health probe task failed");
                    continue;
                }
            };

            report.probed += 1;
            match &outcome {
                ProbeOutcome::Healthy { .. } => report.passed += 1,
                ProbeOutcome::Unhealthy { .. } => report.failed += 1,
            }
            self.apply(&instance, outcome);
        }

        tracing::debug!(
            probed = report.probed,
            passed = report.passed,
            failed = report.failed,
            "Health check cycle complete"
        );

        self.scaling.evaluate();
        report
    }

    fn apply(&self, instance: &ServiceInstance, outcome: ProbeOutcome) {
        match outcome {
            ProbeOutcome::Healthy { latency } => {
                instance.record_probe(Some(latency));
                self.metrics
                    .increment_counter("lb_health_checks_total", &[("result", "healthy".to_string())]);
                self.metrics.record_histogram(
                    "lb_health_check_duration_seconds",
                    latency.as_secs_f64(),
                    &[("instance", instance.address())],
                );
                // A drain may have started while the probe was in flight.
                if !instance.is_healthy() && !instance.is_draining() {
                    self.tracker.mark_healthy(instance);
                }
            }
            ProbeOutcome::Unhealthy { reason } => {
                instance.record_probe(None);
                self.metrics
                    .increment_counter("lb_health_checks_total", &[("result", "unhealthy".to_string())]);
                if instance.is_healthy() {
                    instance.record_error();
                    self.tracker.mark_unhealthy(instance, reason);
                }
            }
        }
    }
}

async fn probe_with_retries(
    probe: Arc<dyn HealthProbe>,
    instance: InstanceSnapshot,
    config: HealthCheckConfig,
) -> ProbeOutcome {
    let backoff = Backoff::from(&config);
    let timeout = config.timeout();
    let mut reason = String::new();

    for attempt in 0..=config.retries {
        if attempt > 0 {
            time::sleep(backoff.delay(attempt)).await;
        }

        let started = Instant::now();
        match time::timeout(timeout, probe.probe(&instance)).await {
            Ok(Ok(true)) => {
                return ProbeOutcome::Healthy {
                    latency: started.elapsed(),
                }
            }
            Ok(Ok(false)) => reason = "probe reported unhealthy".to_string(),
            Ok(Err(e)) => reason = e.to_string(),
            Err(_) => reason = ProbeError::Timeout(timeout).to_string(),
        }

        tracing::debug!(
            instance_id = %instance.id,
            attempt,
            reason = %reason,
            "Health probe attempt failed"
        );
    }

    ProbeOutcome::Unhealthy { reason }
}
