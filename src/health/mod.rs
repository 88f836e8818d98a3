//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (active.rs)
//!     → probe.rs (HTTP/TCP or injected probe, per instance, concurrently)
//!     → timeout + retries with backoff
//!     → state.rs (Healthy ⇄ Unhealthy, events, emergency check)
//!     → autoscale.rs (utilization → scale up/down signals)
//!
//! Release with failure (admission)
//!     → error rate above threshold
//!     → state.rs (mark unhealthy)
//! ```
//!
//! # Design Decisions
//! - One instance's probe failure, hang, or panic never affects the others
//! - Every transition goes through `HealthTracker`, whichever subsystem caused it
//! - Draining instances are not probed and cannot be revived

pub mod active;
pub mod autoscale;
pub mod probe;
pub mod state;

pub use active::{HealthChecker, HealthCycleReport};
pub use autoscale::{ScalingDirection, ScalingEvaluator};
pub use probe::{HealthProbe, HttpProbe, ProbeError, TcpProbe};
pub use state::{HealthState, HealthTracker};
