//! Admission control.
//!
//! # Responsibilities
//! - Admit requests against the per-instance and global connection limits
//! - Queue requests that arrive while at capacity, up to the queue bound
//! - Settle queued requests in FIFO order as capacity frees up
//! - Track releases and the per-instance error rate
//!
//! # Locking
//! One `parking_lot::Mutex<AdmissionState>` guards the global connection
//! count, the queue, and the accepting flag. Per-instance connection
//! counters only change while it is held, so at quiescence the global count
//! equals the sum of instance counts. Lock order is admission state, then
//! registry read. Health transitions run after the lock is dropped.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::oneshot;
use tokio::time;
use uuid::Uuid;

use crate::admission::connection::{ConnectionId, LoadBalancingResult, SelectionDecision};
use crate::admission::queue::{PendingRequest, RequestQueue, Settlement};
use crate::config::{ConnectionLimits, LoadBalancerConfig};
use crate::error::{LoadBalancerError, LoadBalancerResult};
use crate::health::state::HealthTracker;
use crate::load_balancer::instance::ServiceInstance;
use crate::load_balancer::least_conn::LeastConnections;
use crate::load_balancer::pool::InstanceRegistry;
use crate::load_balancer::{selector_for, SelectionContext, Selector};
use crate::observability::metrics::MetricsSink;

struct AdmissionState {
    total_connections: usize,
    queue: RequestQueue,
    accepting: bool,
}

/// Result of one admission attempt under the lock.
#[derive(Debug)]
enum Admission {
    Admitted(LoadBalancingResult),
    AtCapacity,
}

pub struct AdmissionController {
    state: Mutex<AdmissionState>,
    registry: Arc<InstanceRegistry>,
    health: Arc<HealthTracker>,
    selector: Box<dyn Selector>,
    fallback: LeastConnections,
    limits: ConnectionLimits,
    error_rate_threshold: f64,
    metrics: Arc<dyn MetricsSink>,
}

impl AdmissionController {
    pub fn new(
        config: &LoadBalancerConfig,
        registry: Arc<InstanceRegistry>,
        health: Arc<HealthTracker>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            state: Mutex::new(AdmissionState {
                total_connections: 0,
                queue: RequestQueue::new(config.limits.queue_size),
                accepting: true,
            }),
            registry,
            health,
            selector: selector_for(config.strategy),
            fallback: LeastConnections::new(),
            limits: config.limits.clone(),
            error_rate_threshold: config.monitoring.alert_thresholds.error_rate,
            metrics,
        }
    }

    /// Admit a request, waiting in the queue if every instance is full.
    pub async fn next_instance(&self, context: SelectionContext) -> LoadBalancerResult<LoadBalancingResult> {
        let pending = {
            let mut state = self.state.lock();
            match self.try_admit(&mut state, &context, false) {
                Ok(Admission::Admitted(result)) => return Ok(result),
                Ok(Admission::AtCapacity) => match state.queue.enqueue(context) {
                    Ok(pending) => {
                        tracing::debug!(
                            queue_id = pending.id,
                            queue_size = state.queue.len(),
                            "At capacity, request queued"
                        );
                        pending
                    }
                    Err(e) => {
                        self.record_rejection(&e);
                        return Err(e);
                    }
                },
                Err(e) => {
                    self.record_rejection(&e);
                    return Err(e);
                }
            }
        };

        let outcome = self.await_queued(pending).await;
        if let Err(e) = &outcome {
            self.record_rejection(e);
        }
        outcome
    }

    /// Wait for a queued request to be settled or to hit its deadline.
    async fn await_queued(&self, pending: PendingRequest) -> LoadBalancerResult<LoadBalancingResult> {
        let deadline = pending.enqueued_at + self.limits.queue_timeout();
        let mut wait = QueuedWait {
            controller: self,
            id: pending.id,
            receiver: pending.receiver,
            finished: false,
        };

        let outcome = match time::timeout_at(deadline, &mut wait.receiver).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without settling: skipped as expired.
            Ok(Err(_)) => Err(LoadBalancerError::QueueTimeout),
            Err(_) => {
                let removed = self.state.lock().queue.remove(wait.id);
                if removed {
                    tracing::debug!(queue_id = wait.id, "Queued request timed out");
                    Err(LoadBalancerError::QueueTimeout)
                } else {
                    // Settled under the lock before we got it; the outcome is waiting.
                    wait.receiver.try_recv().unwrap_or(Err(LoadBalancerError::QueueTimeout))
                }
            }
        };
        wait.finished = true;
        outcome
    }

    fn try_admit(
        &self,
        state: &mut AdmissionState,
        context: &SelectionContext,
        queued: bool,
    ) -> LoadBalancerResult<Admission> {
        if !state.accepting {
            return Err(LoadBalancerError::ServiceShuttingDown);
        }

        let healthy = self.registry.healthy();
        if healthy.is_empty() {
            return Err(LoadBalancerError::NoHealthyInstances);
        }

        if state.total_connections >= self.limits.max_total {
            return Ok(Admission::AtCapacity);
        }

        let mut capacity_fallback = false;
        let chosen = match self.selector.select(&healthy, context) {
            Some(instance) if !instance.is_at_capacity() => instance,
            _ => {
                let spare: Vec<_> = healthy.into_iter().filter(|i| !i.is_at_capacity()).collect();
                match self.fallback.select(&spare, context) {
                    Some(instance) => {
                        capacity_fallback = true;
                        instance
                    }
                    None => return Ok(Admission::AtCapacity),
                }
            }
        };

        chosen.inc_connections();
        state.total_connections += 1;

        let strategy = self.selector.strategy();
        self.metrics.increment_counter(
            "lb_admissions_total",
            &[
                ("instance", chosen.address()),
                ("strategy", strategy.as_str().to_string()),
            ],
        );

        Ok(Admission::Admitted(LoadBalancingResult {
            instance: chosen.snapshot(),
            connection_id: ConnectionId::new(),
            decision: SelectionDecision {
                strategy,
                capacity_fallback,
                queued,
            },
            timestamp: SystemTime::now(),
        }))
    }

    /// Release a connection. Returns false for an unknown instance.
    ///
    /// A failed request counts against the instance; once its error rate
    /// crosses the alert threshold the instance is marked unhealthy.
    pub fn release(&self, connection_id: &ConnectionId, instance_id: Uuid, success: bool) -> bool {
        let (known, breach) = {
            let mut state = self.state.lock();
            match self.registry.get(instance_id) {
                None => (false, None),
                Some(instance) => {
                    if instance.dec_connections() {
                        state.total_connections = state.total_connections.saturating_sub(1);
                    }
                    let breach = if success {
                        None
                    } else {
                        let errors = instance.record_error();
                        let rate = errors as f64 / (instance.connections() as u64 + errors) as f64;
                        (rate > self.error_rate_threshold).then_some((instance, rate))
                    };
                    (true, breach)
                }
            }
        };

        if known {
            let outcome = if success { "success" } else { "failure" };
            self.metrics
                .increment_counter("lb_releases_total", &[("outcome", outcome.to_string())]);
        } else {
            tracing::debug!(%connection_id, %instance_id, "Release for unknown instance ignored");
        }

        if let Some((instance, rate)) = breach {
            self.health
                .mark_unhealthy(&instance, format!("error rate {rate:.3} above threshold"));
        }

        self.drain_queue();
        known
    }

    /// Settle queued requests in FIFO order while capacity remains.
    pub fn drain_queue(&self) {
        let mut state = self.state.lock();
        let timeout = self.limits.queue_timeout();

        while state.total_connections < self.limits.max_total {
            let Some(entry) = state.queue.pop_front() else {
                break;
            };

            if entry.is_expired(timeout) || entry.is_abandoned() {
                // Dropping the entry closes its channel; the waiter reports a timeout.
                tracing::debug!(queue_id = entry.id(), "Skipping expired queue entry");
                continue;
            }

            match self.try_admit(&mut state, &entry.context, true) {
                Ok(Admission::Admitted(result)) => {
                    let waited = entry.enqueued_at.elapsed();
                    let instance_id = result.instance_id();
                    if entry.settle(Ok(result)).is_err() {
                        self.rollback(&mut state, instance_id);
                    } else {
                        self.metrics.record_histogram(
                            "lb_queue_wait_seconds",
                            waited.as_secs_f64(),
                            &[],
                        );
                    }
                }
                Ok(Admission::AtCapacity) => {
                    state.queue.push_front(entry);
                    break;
                }
                Err(e) => {
                    let _ = entry.settle(Err(e));
                }
            }
        }
    }

    /// Undo an admission whose waiter went away before receiving it.
    fn rollback(&self, state: &mut AdmissionState, instance_id: Uuid) {
        if let Some(instance) = self.registry.get(instance_id) {
            if instance.dec_connections() {
                state.total_connections = state.total_connections.saturating_sub(1);
            }
        }
    }

    /// Zero an instance's connection count, returning how many were dropped.
    pub fn force_close(&self, instance: &ServiceInstance) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = instance.reset_connections();
            state.total_connections = state.total_connections.saturating_sub(dropped);
            dropped
        };

        if dropped > 0 {
            tracing::warn!(
                instance_id = %instance.id,
                addr = %instance.address(),
                dropped,
                "Drain timed out, forcing connections closed"
            );
            self.metrics.increment_counter("lb_forced_closes_total", &[]);
            self.drain_queue();
        }
        dropped
    }

    /// Stop accepting and reject every pending request. Returns how many
    /// queued requests were rejected.
    pub fn close(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            state.accepting = false;
            state.queue.take_all()
        };

        let rejected = pending.len();
        for entry in pending {
            let _ = entry.settle(Err(LoadBalancerError::ServiceShuttingDown));
        }
        if rejected > 0 {
            tracing::info!(rejected, "Rejected queued requests on shutdown");
        }
        rejected
    }

    pub fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }

    pub fn total_connections(&self) -> usize {
        self.state.lock().total_connections
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn record_rejection(&self, error: &LoadBalancerError) {
        let reason = match error {
            LoadBalancerError::NoHealthyInstances => "no_healthy_instances",
            LoadBalancerError::QueueFull => "queue_full",
            LoadBalancerError::QueueTimeout => "queue_timeout",
            LoadBalancerError::ServiceShuttingDown => "shutting_down",
            LoadBalancerError::InvalidInstance(_) => "invalid_instance",
        };
        self.metrics
            .increment_counter("lb_rejections_total", &[("reason", reason.to_string())]);
    }
}

/// A waiter's claim on its queue entry.
///
/// If the waiting future is dropped before it sees its outcome, the entry is
/// withdrawn, or an admission that was already handed over is undone.
struct QueuedWait<'a> {
    controller: &'a AdmissionController,
    id: u64,
    receiver: oneshot::Receiver<Settlement>,
    finished: bool,
}

impl Drop for QueuedWait<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let freed = {
            let mut state = self.controller.state.lock();
            if state.queue.remove(self.id) {
                false
            } else {
                match self.receiver.try_recv() {
                    Ok(Ok(result)) => {
                        self.controller.rollback(&mut state, result.instance_id());
                        true
                    }
                    _ => false,
                }
            }
        };

        tracing::debug!(queue_id = self.id, released = freed, "Queued request abandoned");
        if freed {
            self.controller.drain_queue();
        }
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("strategy", &self.selector.strategy())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
