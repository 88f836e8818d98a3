//! Service Balancer Library
//!
//! Distributes connections across a dynamic set of service instances with
//! health checking, admission control, draining, and failover.
//!
//! ```text
//!  register ──▶ load_balancer::pool ◀── health (probe → state → autoscale)
//!                      │
//!  get_next_instance ──▶ admission (select → admit | queue | reject)
//!  release_connection ─▶ admission (decrement → error rate → drain queue)
//!  unregister/failover ▶ lifecycle::drain (unhealthy → wait → force close)
//!                      │
//!               observability (events, metrics, stats, monitor)
//! ```

pub mod admission;
pub mod balancer;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;

pub use admission::{ConnectionId, LoadBalancingResult, SelectionDecision};
pub use balancer::{LoadBalancer, LoadBalancerBuilder};
pub use config::{InstanceDescriptor, LoadBalancerConfig, Strategy};
pub use error::{LoadBalancerError, LoadBalancerResult};
pub use health::{HealthProbe, ProbeError};
pub use lifecycle::DrainOutcome;
pub use load_balancer::instance::InstanceSnapshot;
pub use load_balancer::SelectionContext;
pub use observability::{Alert, AlertKind, LoadBalancerEvent, LoadBalancerStatistics, MetricsSink};
