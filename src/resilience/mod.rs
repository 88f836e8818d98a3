//! Resilience helpers.
//!
//! Health probe attempts are retried with exponential backoff before an
//! instance is marked unhealthy; each attempt carries its own deadline.

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
