//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use uuid::Uuid;

use service_balancer::load_balancer::instance::InstanceSnapshot;
use service_balancer::{
    HealthProbe, InstanceDescriptor, LoadBalancer, LoadBalancerConfig, LoadBalancerEvent, ProbeError,
};

/// Probe whose answer per port is set by the test. Unknown ports are healthy.
#[derive(Default)]
pub struct ScriptedProbe {
    down: Mutex<HashMap<u16, String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, port: u16, reason: &str) {
        self.down.lock().insert(port, reason.to_string());
    }

    /// Make every probe take `delay` before answering.
    pub fn slow(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn recover(&self, port: u16) {
        self.down.lock().remove(&port);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, instance: &InstanceSnapshot) -> Result<bool, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.down.lock().get(&instance.port) {
            Some(reason) => Err(ProbeError::Other(reason.clone())),
            None => Ok(true),
        }
    }
}

/// Defaults with every background loop off, so tests drive each step.
pub fn manual_config() -> LoadBalancerConfig {
    let mut config = LoadBalancerConfig::default();
    config.health_check.enabled = false;
    config.monitoring.enabled = false;
    config.health_check.retries = 0;
    config
}

pub fn balancer(config: LoadBalancerConfig, probe: Arc<ScriptedProbe>) -> LoadBalancer {
    LoadBalancer::builder(config).probe(probe).build().unwrap()
}

/// Register `count` instances on ports 7000.. with the given cap.
pub fn register_instances(lb: &LoadBalancer, count: u16, max_connections: usize) -> Vec<Uuid> {
    (0..count)
        .map(|n| {
            lb.register(InstanceDescriptor::new("127.0.0.1", 7000 + n).with_max_connections(max_connections))
                .unwrap()
        })
        .collect()
}

pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<LoadBalancerEvent>) -> Vec<LoadBalancerEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Start a minimal HTTP backend answering every request with `status`.
/// The status can be changed while it runs.
pub async fn start_http_backend(status: Arc<AtomicU16>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let status = status.load(Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let reason = match status {
                    200 => "OK",
                    204 => "No Content",
                    503 => "Service Unavailable",
                    _ => "Unknown",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status, reason
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
