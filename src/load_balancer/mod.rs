//! Instance registry and selection strategies.
//!
//! # Data Flow
//! ```text
//! Admission request
//!     → pool.rs (current healthy set, registration order)
//!     → Apply the configured Selector:
//!         - round_robin.rs (rotate through the healthy set)
//!         - weighted.rs (weight-proportional random draw)
//!         - least_conn.rs (pick instance with fewest connections)
//!         - ip_hash.rs (client address → fixed position)
//!         - random.rs (uniform pick)
//!     → instance.rs (connection counters, capacity check)
//! ```
//!
//! # Design Decisions
//! - Selectors never mutate instance state; admission owns the counters
//! - The strategy is chosen once at construction
//! - Callers guarantee a non-empty healthy set; an empty slice yields None

pub mod instance;
pub mod ip_hash;
pub mod least_conn;
pub mod pool;
pub mod random;
pub mod round_robin;
pub mod weighted;

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::Strategy;
use self::instance::ServiceInstance;

/// Per-request hints available to a selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionContext {
    /// Client address, used by ip_hash.
    pub client_ip: Option<IpAddr>,
}

impl SelectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }
}

/// Picks one instance from the healthy set.
pub trait Selector: Send + Sync + std::fmt::Debug {
    fn select(
        &self,
        healthy: &[Arc<ServiceInstance>],
        context: &SelectionContext,
    ) -> Option<Arc<ServiceInstance>>;

    fn strategy(&self) -> Strategy;
}

/// Build the selector for a configured strategy.
pub fn selector_for(strategy: Strategy) -> Box<dyn Selector> {
    match strategy {
        Strategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Strategy::WeightedRoundRobin => Box::new(weighted::WeightedRoundRobin::new()),
        Strategy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        Strategy::IpHash => Box::new(ip_hash::IpHash::new()),
        Strategy::Random => Box::new(random::RandomSelection::new()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_for_each_strategy() {
        for strategy in [
            Strategy::RoundRobin,
            Strategy::WeightedRoundRobin,
            Strategy::LeastConnections,
            Strategy::IpHash,
            Strategy::Random,
        ] {
            let selector = selector_for(strategy);
            assert_eq!(selector.strategy(), strategy);
            assert!(selector.select(&[], &SelectionContext::new()).is_none());

            let pool = test_support::instances(2);
            assert!(selector.select(&pool, &SelectionContext::new()).is_some());
        }
    }
}
