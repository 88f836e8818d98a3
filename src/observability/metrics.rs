//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the metrics sink the core reports into
//! - Forward to the `metrics` facade when a recorder is installed
//! - Expose a Prometheus-compatible endpoint (binary only)
//!
//! # Metrics
//! - `lb_admissions_total` (counter): admitted connections by instance, strategy
//! - `lb_rejections_total` (counter): admission failures by reason
//! - `lb_queue_wait_seconds` (histogram): time spent queued before admission
//! - `lb_releases_total` (counter): releases by outcome
//! - `lb_health_checks_total` (counter): probe results
//! - `lb_health_check_duration_seconds` (histogram): probe latency by instance
//! - `lb_health_transitions_total` (counter): health transitions by target state
//! - `lb_forced_closes_total` (counter): drains that hit their bound
//! - `lb_scaling_signals_total` (counter): scale up/down/emergency signals
//! - `lb_alerts_total` (counter): monitoring alerts by kind
//! - `lb_utilization`, `lb_error_rate`, `lb_average_response_time_ms` (histograms)
//!
//! # Design Decisions
//! - Fire-and-forget; a missing sink never affects balancing decisions
//! - Labels are static keys with owned values

use metrics::Label;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Label set attached to a metric.
pub type Labels<'a> = &'a [(&'static str, String)];

/// Destination for counters and histograms.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str, labels: Labels<'_>);

    fn record_histogram(&self, name: &'static str, value: f64, labels: Labels<'_>);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment_counter(&self, _name: &'static str, _labels: Labels<'_>) {}

    fn record_histogram(&self, _name: &'static str, _value: f64, _labels: Labels<'_>) {}
}

/// Forwards to the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderMetrics;

fn to_labels(labels: Labels<'_>) -> Vec<Label> {
    labels
        .iter()
        .map(|(key, value)| Label::new(*key, value.clone()))
        .collect()
}

impl MetricsSink for RecorderMetrics {
    fn increment_counter(&self, name: &'static str, labels: Labels<'_>) {
        metrics::counter!(name, to_labels(labels)).increment(1);
    }

    fn record_histogram(&self, name: &'static str, value: f64, labels: Labels<'_>) {
        metrics::histogram!(name, to_labels(labels)).record(value);
    }
}

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Records counter names for assertions.
    #[derive(Debug, Default)]
    pub struct CapturingMetrics {
        pub counters: Mutex<Vec<(String, Vec<(String, String)>)>>,
        pub histograms: Mutex<Vec<(String, f64)>>,
    }

    impl CapturingMetrics {
        pub fn count(&self, name: &str) -> usize {
            self.counters.lock().iter().filter(|(n, _)| n == name).count()
        }
    }

    impl MetricsSink for CapturingMetrics {
        fn increment_counter(&self, name: &'static str, labels: Labels<'_>) {
            let labels = labels.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            self.counters.lock().push((name.to_string(), labels));
        }

        fn record_histogram(&self, name: &'static str, value: f64, _labels: Labels<'_>) {
            self.histograms.lock().push((name.to_string(), value));
        }
    }
}
