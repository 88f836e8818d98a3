//! Concurrent admission/release load against the connection invariants.

use rand::Rng;
use std::time::{Duration, Instant};

use service_balancer::{LoadBalancerError, SelectionContext, Strategy};

mod common;
use common::{balancer, manual_config, register_instances, ScriptedProbe};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invariants_under_concurrent_load() {
    let mut config = manual_config();
    config.strategy = Strategy::LeastConnections;
    config.limits.max_total = 15;
    config.limits.queue_size = 1_000;
    // Failed releases must not take instances out of rotation here.
    config.monitoring.alert_thresholds.error_rate = 1.0;
    let lb = balancer(config, ScriptedProbe::new());
    register_instances(&lb, 4, 5);

    let concurrency = 16;
    let requests_per_task = 200;
    let start = Instant::now();

    let workers: Vec<_> = (0..concurrency)
        .map(|_| {
            let lb = lb.clone();
            tokio::spawn(async move {
                let mut admitted = 0usize;
                for _ in 0..requests_per_task {
                    let result = match lb.get_next_instance(SelectionContext::new()).await {
                        Ok(result) => result,
                        Err(LoadBalancerError::QueueFull) => continue,
                        Err(e) => panic!("unexpected admission failure: {e}"),
                    };
                    admitted += 1;

                    let hold = rand::thread_rng().gen_range(0..200);
                    tokio::time::sleep(Duration::from_micros(hold)).await;
                    let success = rand::thread_rng().gen_bool(0.9);
                    lb.release_connection(&result.connection_id, result.instance_id(), success);
                }
                admitted
            })
        })
        .collect();

    let watcher = {
        let lb = lb.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                for snap in lb.list_instances() {
                    assert!(snap.current_connections <= snap.max_connections);
                }
                assert!(lb.statistics().total_connections <= 15);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let mut admitted = 0;
    for worker in workers {
        admitted += worker.await.unwrap();
    }
    watcher.await.unwrap();

    let elapsed = start.elapsed();
    println!(
        "admitted {} of {} requests in {:?} ({:.0} req/s)",
        admitted,
        concurrency * requests_per_task,
        elapsed,
        admitted as f64 / elapsed.as_secs_f64()
    );

    // Quiescent: the global count equals the per-instance sum, and both are zero.
    let stats = lb.statistics();
    let sum: usize = lb.list_instances().iter().map(|s| s.current_connections).sum();
    assert_eq!(stats.total_connections, sum);
    assert_eq!(sum, 0);
    assert_eq!(stats.queue_size, 0);
    assert_eq!(stats.healthy_instances, 4);
    assert!(admitted > 0);
}
