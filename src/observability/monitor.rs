//! Periodic monitoring and alerting.
//!
//! Each tick collects statistics, records them as histograms, and raises an
//! alert for every threshold that is exceeded.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::admission::AdmissionController;
use crate::config::MonitoringConfig;
use crate::load_balancer::pool::InstanceRegistry;
use crate::observability::metrics::MetricsSink;
use crate::observability::stats::LoadBalancerStatistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ErrorRate,
    ResponseTime,
    Utilization,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::ErrorRate => "error_rate",
            AlertKind::ResponseTime => "response_time",
            AlertKind::Utilization => "utilization",
        }
    }
}

/// A threshold breach observed by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
}

pub struct Monitor {
    registry: Arc<InstanceRegistry>,
    admission: Arc<AdmissionController>,
    metrics: Arc<dyn MetricsSink>,
    config: MonitoringConfig,
}

impl Monitor {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        admission: Arc<AdmissionController>,
        metrics: Arc<dyn MetricsSink>,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            registry,
            admission,
            metrics,
            config,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.config.interval_secs, "Monitor starting");

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first report
        // covers a full interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Collect statistics, record them, and return any threshold breaches.
    pub fn check(&self) -> Vec<Alert> {
        let stats = LoadBalancerStatistics::collect(&self.registry, &self.admission);

        self.metrics.record_histogram("lb_utilization", stats.utilization, &[]);
        self.metrics.record_histogram("lb_error_rate", stats.error_rate, &[]);
        self.metrics
            .record_histogram("lb_average_response_time_ms", stats.average_response_time_ms, &[]);

        let thresholds = &self.config.alert_thresholds;
        let candidates = [
            (AlertKind::ErrorRate, stats.error_rate, thresholds.error_rate),
            (
                AlertKind::ResponseTime,
                stats.average_response_time_ms,
                thresholds.response_time_ms as f64,
            ),
            (AlertKind::Utilization, stats.utilization, thresholds.utilization),
        ];

        let alerts: Vec<Alert> = candidates
            .into_iter()
            .filter(|(_, value, threshold)| value > threshold)
            .map(|(kind, value, threshold)| Alert { kind, value, threshold })
            .collect();

        for alert in &alerts {
            tracing::warn!(
                kind = alert.kind.as_str(),
                value = alert.value,
                threshold = alert.threshold,
                "Monitoring threshold exceeded"
            );
            self.metrics
                .increment_counter("lb_alerts_total", &[("kind", alert.kind.as_str().to_string())]);
        }
        alerts
    }
}
