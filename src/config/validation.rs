//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, thresholds within [0, 1])
//! - Check instance descriptors (host, port, weight)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LoadBalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{InstanceDescriptor, LoadBalancerConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &LoadBalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let hc = &config.health_check;
    // The interval also paces autoscaling when health checks are off.
    if (hc.enabled || config.failover.auto_scaling) && hc.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
    }
    if hc.enabled && hc.timeout_secs == 0 {
        errors.push(ValidationError::new("health_check.timeout_secs", "must be greater than 0"));
    }
    if let Some(path) = &hc.path {
        if !path.starts_with('/') {
            errors.push(ValidationError::new("health_check.path", "must start with '/'"));
        }
    }
    if let Some(status) = hc.expected_status {
        if !(100..=599).contains(&status) {
            errors.push(ValidationError::new("health_check.expected_status", "must be a valid HTTP status"));
        }
    }

    let fo = &config.failover;
    check_ratio(&mut errors, "failover.scale_up_threshold", fo.scale_up_threshold);
    check_ratio(&mut errors, "failover.scale_down_threshold", fo.scale_down_threshold);
    if fo.auto_scaling && fo.scale_down_threshold >= fo.scale_up_threshold {
        errors.push(ValidationError::new(
            "failover.scale_down_threshold",
            "must be lower than scale_up_threshold",
        ));
    }

    let limits = &config.limits;
    if limits.max_per_instance == 0 {
        errors.push(ValidationError::new("limits.max_per_instance", "must be greater than 0"));
    }
    if limits.max_total == 0 {
        errors.push(ValidationError::new("limits.max_total", "must be greater than 0"));
    }
    if limits.queue_drain_interval_ms == 0 {
        errors.push(ValidationError::new("limits.queue_drain_interval_ms", "must be greater than 0"));
    }

    if config.drain.poll_interval_ms == 0 {
        errors.push(ValidationError::new("drain.poll_interval_ms", "must be greater than 0"));
    }

    let mon = &config.monitoring;
    if mon.enabled && mon.interval_secs == 0 {
        errors.push(ValidationError::new("monitoring.interval_secs", "must be greater than 0"));
    }
    check_ratio(&mut errors, "monitoring.alert_thresholds.error_rate", mon.alert_thresholds.error_rate);
    check_ratio(&mut errors, "monitoring.alert_thresholds.utilization", mon.alert_thresholds.utilization);

    for (i, instance) in config.instances.iter().enumerate() {
        for problem in validate_instance(instance) {
            errors.push(ValidationError::new(format!("instances[{}]", i), problem));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a single instance descriptor. Returns human-readable problems.
pub fn validate_instance(instance: &InstanceDescriptor) -> Vec<String> {
    let mut problems = Vec::new();
    if instance.host.trim().is_empty() {
        problems.push("host must not be empty".to_string());
    }
    if instance.port == 0 {
        problems.push("port must be greater than 0".to_string());
    }
    if !(instance.weight.is_finite() && instance.weight > 0.0) {
        problems.push("weight must be a positive number".to_string());
    }
    if instance.max_connections == Some(0) {
        problems.push("max_connections must be greater than 0".to_string());
    }
    problems
}

fn check_ratio(errors: &mut Vec<ValidationError>, field: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ValidationError::new(field, "must be between 0.0 and 1.0"));
    }
}
