//! Failure injection against real probes and background health checking.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use service_balancer::{InstanceDescriptor, LoadBalancer, LoadBalancerError, LoadBalancerEvent, SelectionContext};

mod common;
use common::{manual_config, start_http_backend, ScriptedProbe};

#[tokio::test]
async fn http_probe_follows_backend_status() {
    let status = Arc::new(AtomicU16::new(200));
    let addr = start_http_backend(status.clone()).await;

    let mut config = manual_config();
    config.health_check.path = Some("/health".into());
    let lb = LoadBalancer::builder(config).build().unwrap();
    let id = lb
        .register(InstanceDescriptor::new(addr.ip().to_string(), addr.port()))
        .unwrap();

    let report = lb.run_health_checks().await;
    assert_eq!(report.passed, 1);
    assert!(lb.instance(id).unwrap().healthy);

    status.store(503, Ordering::SeqCst);
    lb.run_health_checks().await;
    assert!(!lb.instance(id).unwrap().healthy);
    assert_eq!(
        lb.get_next_instance(SelectionContext::new()).await.unwrap_err(),
        LoadBalancerError::NoHealthyInstances
    );

    status.store(200, Ordering::SeqCst);
    lb.run_health_checks().await;
    assert!(lb.instance(id).unwrap().healthy);
    assert!(lb.get_next_instance(SelectionContext::new()).await.is_ok());
}

#[tokio::test]
async fn http_probe_honours_expected_status() {
    let status = Arc::new(AtomicU16::new(200));
    let addr = start_http_backend(status.clone()).await;

    let mut config = manual_config();
    config.health_check.path = Some("/ready".into());
    config.health_check.expected_status = Some(204);
    let lb = LoadBalancer::builder(config).build().unwrap();
    let id = lb
        .register(InstanceDescriptor::new(addr.ip().to_string(), addr.port()))
        .unwrap();

    lb.run_health_checks().await;
    assert!(!lb.instance(id).unwrap().healthy);

    status.store(204, Ordering::SeqCst);
    lb.run_health_checks().await;
    assert!(lb.instance(id).unwrap().healthy);
}

#[tokio::test]
async fn tcp_probe_marks_closed_port_unhealthy() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap();
    let closed = {
        let temp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        temp.local_addr().unwrap()
    };

    let mut config = manual_config();
    config.health_check.retries = 1;
    let lb = LoadBalancer::builder(config).build().unwrap();
    let up = lb.register(InstanceDescriptor::new("127.0.0.1", open.port())).unwrap();
    let down = lb.register(InstanceDescriptor::new("127.0.0.1", closed.port())).unwrap();

    let report = lb.run_health_checks().await;
    assert_eq!((report.passed, report.failed), (1, 1));
    assert!(lb.instance(up).unwrap().healthy);

    let snap = lb.instance(down).unwrap();
    assert!(!snap.healthy);
    assert_eq!(snap.error_count, 1);
    drop(listener);
}

#[tokio::test]
async fn background_checker_detects_failure() {
    let probe = ScriptedProbe::new();
    let mut config = manual_config();
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    let lb = common::balancer(config, probe.clone());
    let id = lb.register(InstanceDescriptor::new("127.0.0.1", 7000)).unwrap();
    let mut rx = lb.subscribe();

    probe.fail(7000, "connection reset");
    lb.start();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(LoadBalancerEvent::InstanceUnhealthy { instance_id, reason }) => break (instance_id, reason),
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("instance should be marked unhealthy");

    assert_eq!(event.0, id);
    assert!(event.1.contains("connection reset"));

    lb.shutdown().await;
    let calls = probe.calls();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(probe.calls(), calls, "health checks must stop after shutdown");
}

#[tokio::test]
async fn autoscaler_runs_without_health_checks() {
    let mut config = manual_config();
    config.failover.auto_scaling = true;
    config.health_check.interval_secs = 1;
    let lb = common::balancer(config, ScriptedProbe::new());
    let first = lb
        .register(InstanceDescriptor::new("127.0.0.1", 7000).with_max_connections(2))
        .unwrap();
    let held = [
        lb.get_next_instance(SelectionContext::new()).await.unwrap(),
        lb.get_next_instance(SelectionContext::new()).await.unwrap(),
    ];
    let mut rx = lb.subscribe();

    lb.start();
    let signalled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(LoadBalancerEvent::ScaleUpTriggered { utilization, .. }) = rx.recv().await {
                break utilization;
            }
        }
    })
    .await
    .expect("scale up should be signalled");
    assert_eq!(signalled, 1.0);

    for r in &held {
        lb.release_connection(&r.connection_id, first, true);
    }
    lb.shutdown().await;
    assert!(lb.instance(first).is_some());
}

#[tokio::test]
async fn shutdown_rejects_requests_while_health_cycle_in_flight() {
    let probe = ScriptedProbe::new();
    probe.slow(Duration::from_secs(2));
    let mut config = manual_config();
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    let lb = common::balancer(config, probe.clone());
    lb.register(InstanceDescriptor::new("127.0.0.1", 7000)).unwrap();

    lb.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(probe.calls(), 1, "first health cycle should be mid-probe");

    let stopping = lb.clone();
    let shutdown = tokio::spawn(async move { stopping.shutdown().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(lb.is_shutting_down());
    assert!(!shutdown.is_finished(), "shutdown should still be waiting on the probe");
    assert_eq!(
        lb.get_next_instance(SelectionContext::new()).await.unwrap_err(),
        LoadBalancerError::ServiceShuttingDown
    );

    shutdown.await.unwrap();
}
