//! Least Connections selection strategy.

use std::sync::Arc;

use crate::config::Strategy;
use crate::load_balancer::{instance::ServiceInstance, SelectionContext, Selector};

/// Least connections selector.
/// Selects the instance with the minimum number of active connections.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for LeastConnections {
    fn select(
        &self,
        healthy: &[Arc<ServiceInstance>],
        _context: &SelectionContext,
    ) -> Option<Arc<ServiceInstance>> {
        // min_by_key keeps the first of equal keys, so ties go to iteration order
        healthy.iter().min_by_key(|i| i.connections()).cloned()
    }

    fn strategy(&self) -> Strategy {
        Strategy::LeastConnections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::instances;

    #[test]
    fn test_least_conn() {
        let lb = LeastConnections::new();
        let pool = instances(2);
        let ctx = SelectionContext::new();

        // artificially increase connections on the first instance
        pool[0].inc_connections();

        // Should pick the second (0 connections)
        let s1 = lb.select(&pool, &ctx).unwrap();
        assert_eq!(s1.id, pool[1].id);

        pool[1].inc_connections();
        pool[1].inc_connections();

        // Should pick the first (1 connection)
        let s2 = lb.select(&pool, &ctx).unwrap();
        assert_eq!(s2.id, pool[0].id);
    }

    #[test]
    fn test_ties_go_to_first() {
        let lb = LeastConnections::new();
        let pool = instances(3);
        pool[0].inc_connections();

        let picked = lb.select(&pool, &SelectionContext::new()).unwrap();
        assert_eq!(picked.id, pool[1].id);
    }
}
