//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros (structured log events, logging.rs installs the subscriber)
//!     → metrics.rs (counters and histograms through a MetricsSink)
//!     → events.rs (typed lifecycle events on a broadcast bus)
//!
//! On demand or on a timer:
//!     → stats.rs (aggregate statistics from live state)
//!     → monitor.rs (histograms + threshold alerts)
//! ```
//!
//! # Design Decisions
//! - Statistics are never cached; each read reflects current state
//! - Metrics and events are fire-and-forget and never block admission

pub mod events;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod stats;

pub use events::{EventBus, EventKind, LoadBalancerEvent};
pub use metrics::{MetricsSink, NoopMetrics, RecorderMetrics};
pub use monitor::{Alert, AlertKind, Monitor};
pub use stats::LoadBalancerStatistics;
