//! Uniform random selection strategy.

use rand::seq::SliceRandom;
use std::sync::Arc;

use crate::config::Strategy;
use crate::load_balancer::{instance::ServiceInstance, SelectionContext, Selector};

#[derive(Debug, Default)]
pub struct RandomSelection;

impl RandomSelection {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for RandomSelection {
    fn select(
        &self,
        healthy: &[Arc<ServiceInstance>],
        _context: &SelectionContext,
    ) -> Option<Arc<ServiceInstance>> {
        healthy.choose(&mut rand::thread_rng()).cloned()
    }

    fn strategy(&self) -> Strategy {
        Strategy::Random
    }
}
