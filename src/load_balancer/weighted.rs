//! Weighted selection strategy.

use rand::Rng;
use std::sync::Arc;

use crate::config::Strategy;
use crate::load_balancer::{instance::ServiceInstance, SelectionContext, Selector};

/// Weighted round-robin selector.
///
/// Draws a uniform value in `[0, Σweight)` and walks the healthy set,
/// subtracting each weight until the remainder is no longer positive.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin;

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self
    }

    /// Pick using a caller-supplied draw in `[0, 1)`.
    fn pick(healthy: &[Arc<ServiceInstance>], draw: f64) -> Option<Arc<ServiceInstance>> {
        let first = healthy.first()?;
        let total: f64 = healthy.iter().map(|i| i.weight).sum();

        let mut remaining = draw * total;
        for instance in healthy {
            remaining -= instance.weight;
            if remaining <= 0.0 {
                return Some(instance.clone());
            }
        }

        // rounding left a positive remainder
        Some(first.clone())
    }
}

impl Selector for WeightedRoundRobin {
    fn select(
        &self,
        healthy: &[Arc<ServiceInstance>],
        _context: &SelectionContext,
    ) -> Option<Arc<ServiceInstance>> {
        let draw = rand::thread_rng().gen::<f64>();
        Self::pick(healthy, draw)
    }

    fn strategy(&self) -> Strategy {
        Strategy::WeightedRoundRobin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceDescriptor;

    fn weighted(weights: &[f64]) -> Vec<Arc<ServiceInstance>> {
        weights
            .iter()
            .enumerate()
            .map(|(n, w)| {
                Arc::new(ServiceInstance::new(
                    InstanceDescriptor::new("127.0.0.1", 8000 + n as u16).with_weight(*w),
                    100,
                ))
            })
            .collect()
    }

    #[test]
    fn test_pick_boundaries() {
        let pool = weighted(&[1.0, 9.0]);
        assert_eq!(WeightedRoundRobin::pick(&pool, 0.0).unwrap().id, pool[0].id);
        assert_eq!(WeightedRoundRobin::pick(&pool, 0.1).unwrap().id, pool[0].id);
        assert_eq!(WeightedRoundRobin::pick(&pool, 0.11).unwrap().id, pool[1].id);
        assert_eq!(WeightedRoundRobin::pick(&pool, 0.999).unwrap().id, pool[1].id);
    }

    #[test]
    fn test_weight_proportional_distribution() {
        let lb = WeightedRoundRobin::new();
        let pool = weighted(&[1.0, 9.0]);
        let ctx = SelectionContext::new();

        let heavy = (0..10_000)
            .filter(|_| lb.select(&pool, &ctx).unwrap().id == pool[1].id)
            .count();

        let share = heavy as f64 / 10_000.0;
        assert!((0.88..=0.92).contains(&share), "weight-9 share was {share}");
    }
}
