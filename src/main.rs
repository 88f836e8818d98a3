//! service-balancer
//!
//! Runs the load balancer against the instances listed in a TOML
//! configuration file, probing their health and logging lifecycle events
//! until SIGINT or SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use service_balancer::config::{load_config, LoadBalancerConfig};
use service_balancer::lifecycle::shutdown_signal;
use service_balancer::observability::logging::init_logging;
use service_balancer::observability::metrics::{init_metrics, RecorderMetrics};
use service_balancer::LoadBalancer;

#[derive(Debug, Parser)]
#[command(name = "service-balancer", version, about = "Health-aware service load balancer")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => LoadBalancerConfig::default(),
    };

    init_logging(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        "service-balancer starting"
    );

    let mut builder = LoadBalancer::builder(config.clone());
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                init_metrics(addr);
                builder = builder.metrics(Arc::new(RecorderMetrics));
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }
    let balancer = builder.build()?;

    let mut events = balancer.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(kind = %event.kind(), event = %json, "Event"),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
                },
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    for descriptor in config.instances {
        let addr = format!("{}:{}", descriptor.host, descriptor.port);
        if let Err(e) = balancer.register(descriptor) {
            tracing::error!(addr = %addr, error = %e, "Failed to register instance");
        }
    }

    balancer.start();
    tracing::info!(instances = balancer.list_instances().len(), "Balancing");

    shutdown_signal().await;
    balancer.shutdown().await;

    let stats = balancer.statistics();
    tracing::info!(
        total_connections = stats.total_connections,
        error_rate = stats.error_rate,
        "Final statistics"
    );

    event_log.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
