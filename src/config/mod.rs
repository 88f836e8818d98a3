//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → LoadBalancerConfig (validated, immutable)
//!     → handed to LoadBalancer::builder, shared by all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the load balancer is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AlertThresholds, ConnectionLimits, DrainConfig, FailoverConfig, HealthCheckConfig,
    InstanceDescriptor, LoadBalancerConfig, MonitoringConfig, ObservabilityConfig, Protocol,
    Strategy,
};
