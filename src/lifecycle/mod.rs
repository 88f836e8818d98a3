//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Drain (drain.rs):
//!     Mark draining + unhealthy → poll connections → force close at bound
//!
//! Failover (drain.rs):
//!     Audit reason → unhealthy → failover event → drain
//!
//! Shutdown (shutdown.rs):
//!     Trigger → background loops exit → join → reject queue → drain all
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → LoadBalancer::shutdown (binary only)
//! ```
//!
//! # Design Decisions
//! - Drains favor availability: the bound is enforced by a forced close
//! - Background tasks are tracked so shutdown leaves no timers behind

pub mod drain;
pub mod shutdown;
pub mod signals;

pub use drain::{DrainCoordinator, DrainOutcome};
pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
