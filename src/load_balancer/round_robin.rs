//! Round-robin selection strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Strategy;
use crate::load_balancer::{instance::ServiceInstance, SelectionContext, Selector};

/// Round-robin selector.
///
/// A shared counter advanced on every call, taken modulo the size of the
/// healthy set at that moment. The position is not stable when the healthy
/// set changes membership, so a rotation can skip or repeat an instance
/// around health transitions.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn select(
        &self,
        healthy: &[Arc<ServiceInstance>],
        _context: &SelectionContext,
    ) -> Option<Arc<ServiceInstance>> {
        if healthy.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Some(healthy[index].clone())
    }

    fn strategy(&self) -> Strategy {
        Strategy::RoundRobin
    }
}
