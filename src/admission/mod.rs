//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! get_next_instance(context)
//!     → controller.rs (lock admission state)
//!         → healthy set empty?        → NoHealthyInstances
//!         → selector pick has room?   → admit
//!         → any instance has room?    → admit via least connections
//!         → queue.rs has room?        → wait for settlement or timeout
//!         → otherwise                 → QueueFull
//!     → connection.rs (LoadBalancingResult handed to the caller)
//!
//! release_connection / drain tick
//!     → controller.rs (decrement, error rate, FIFO drain)
//! ```

pub mod connection;
pub mod controller;
pub mod queue;

pub use connection::{ConnectionId, LoadBalancingResult, SelectionDecision};
pub use controller::AdmissionController;
