//! Service instance abstraction.
//!
//! # Responsibilities
//! - Represent a single registered backend instance
//! - Track active connections (for least connections and admission)
//! - Enforce the per-instance connection cap
//! - Track health state, error count, and probe results

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use url::Url;
use uuid::Uuid;

use crate::config::{InstanceDescriptor, Protocol};
use crate::health::state::HealthState;

/// A single registered backend instance.
///
/// Descriptor fields are fixed at registration. Mutable state lives in
/// atomics; `active_connections` is only changed while the admission lock
/// is held.
#[derive(Debug)]
pub struct ServiceInstance {
    /// Identifier assigned at registration.
    pub id: Uuid,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Weight for weighted selection (positive).
    pub weight: f64,
    /// Maximum concurrent connections allowed.
    pub max_connections: usize,
    pub metadata: HashMap<String, String>,

    active_connections: AtomicUsize,
    /// Current health state (1=Healthy, 2=Unhealthy).
    state: AtomicU8,
    error_count: AtomicU64,
    /// Last measured probe latency in microseconds.
    response_time_us: AtomicU64,
    last_health_check: Mutex<SystemTime>,
    draining: AtomicBool,
}

impl ServiceInstance {
    /// Create a healthy instance with zeroed counters.
    pub fn new(descriptor: InstanceDescriptor, default_max_connections: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            host: descriptor.host,
            port: descriptor.port,
            protocol: descriptor.protocol,
            weight: descriptor.weight,
            max_connections: descriptor.max_connections.unwrap_or(default_max_connections),
            metadata: descriptor.metadata,
            active_connections: AtomicUsize::new(0),
            state: AtomicU8::new(HealthState::Healthy as u8),
            error_count: AtomicU64::new(0),
            response_time_us: AtomicU64::new(0),
            last_health_check: Mutex::new(SystemTime::now()),
            draining: AtomicBool::new(false),
        }
    }

    /// `host:port` for logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    // --- Connections ---

    /// Get the current number of active connections.
    pub fn connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn is_at_capacity(&self) -> bool {
        self.connections() >= self.max_connections
    }

    pub(crate) fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement, floored at zero. Returns false if the count was already zero.
    pub(crate) fn dec_connections(&self) -> bool {
        self.active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Force the count to zero, returning how many connections were dropped.
    pub(crate) fn reset_connections(&self) -> usize {
        self.active_connections.swap(0, Ordering::AcqRel)
    }

    // --- Health ---

    pub fn health_state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.health_state() == HealthState::Healthy
    }

    /// Atomically move from `from` to `to`. Returns true only for the caller
    /// that performed the transition.
    pub(crate) fn transition(&self, from: HealthState, to: HealthState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub(crate) fn set_draining(&self) {
        self.draining.store(true, Ordering::Release);
    }

    // --- Errors & probes ---

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Acquire)
    }

    /// Increment the error count, returning the new value.
    pub(crate) fn record_error(&self) -> u64 {
        self.error_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Halve the error count (integer floor) for gradual recovery.
    pub(crate) fn halve_errors(&self) {
        let _ = self
            .error_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n / 2));
    }

    pub fn response_time(&self) -> Duration {
        Duration::from_micros(self.response_time_us.load(Ordering::Acquire))
    }

    pub fn last_health_check(&self) -> SystemTime {
        *self.last_health_check.lock()
    }

    /// Stamp a completed probe, recording latency when one was measured.
    pub(crate) fn record_probe(&self, latency: Option<Duration>) {
        *self.last_health_check.lock() = SystemTime::now();
        if let Some(latency) = latency {
            let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            self.response_time_us.store(micros, Ordering::Release);
        }
    }

    /// Point-in-time copy of the instance.
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            id: self.id,
            host: self.host.clone(),
            port: self.port,
            protocol: self.protocol,
            weight: self.weight,
            healthy: self.is_healthy(),
            draining: self.is_draining(),
            current_connections: self.connections(),
            max_connections: self.max_connections,
            last_health_check: self.last_health_check(),
            response_time: self.response_time(),
            error_count: self.error_count(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Immutable copy of a [`ServiceInstance`] handed out to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    pub id: Uuid,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub weight: f64,
    pub healthy: bool,
    pub draining: bool,
    pub current_connections: usize,
    pub max_connections: usize,
    pub last_health_check: SystemTime,
    pub response_time: Duration,
    pub error_count: u64,
    pub metadata: HashMap<String, String>,
}

impl InstanceSnapshot {
    /// Base URL (`scheme://host:port/`) of the instance.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port))
    }
}
