//! Integration tests for the Volley worker pool
//!
//! These tests drive full runs end to end: lane scheduling, interval
//! collection, shutdown triggers and the exactly-once save.
//! They run on a paused clock, so latencies and rates are deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{sleep, Instant};
use volley_core::prelude::*;
use volley_core::sink::MemorySinkHandle;

fn sleep_op(total: usize, concurrency: usize, config: serde_json::Value) -> WorkerConfig {
    WorkerConfig::new("sleep")
        .with_total(total)
        .with_concurrency(concurrency)
        .with_buffer_capacity(256)
        .with_operation_config(config.as_object().cloned().unwrap_or_default())
}

async fn build(config: WorkerConfig) -> (Worker, MemorySinkHandle) {
    let registry = Registry::with_builtins();
    let (sink, handle) = MemorySink::new();
    let worker = Worker::build(config, &registry, Box::new(sink))
        .await
        .expect("worker should build");
    (worker, handle)
}

/// Fixed-latency operation that counts its own completed calls and can
/// panic on a chosen call of lane 0
struct CountingOperation {
    latency: Duration,
    completed: Arc<AtomicUsize>,
    panic_at: Option<usize>,
}

#[async_trait]
impl Operation for CountingOperation {
    async fn init(&mut self) -> std::result::Result<(), OperationError> {
        Ok(())
    }

    async fn call(&mut self, base: usize, index: usize, _n: usize) -> OpResult {
        if base == 0 && self.panic_at == Some(index) {
            panic!("lane {base} failed on call {index}");
        }
        sleep(self.latency).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        OpResult::success(200, self.latency, 0)
    }
}

fn counting_registry(latency: Duration, panic_at: Option<usize>) -> (Registry, Arc<AtomicUsize>) {
    let completed = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    let counter = completed.clone();
    registry
        .register("counting", move |_: &OperationConfig| {
            Ok(Box::new(CountingOperation {
                latency,
                completed: counter.clone(),
                panic_at,
            }) as Box<dyn Operation>)
        })
        .unwrap();
    (registry, completed)
}

mod completion_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_all_success_run() {
        let (worker, records) = build(sleep_op(100, 10, json!({ "latency_ms": 10 }))).await;

        let report = worker.run().await.unwrap();

        assert_eq!(report.ops, 100);
        assert_eq!(report.success, 100);
        assert_eq!(report.errors, 0);
        assert_eq!(records.total_success(), 100);
        assert_eq!(records.total_errors(), 0);
        assert_eq!(records.saves(), 1);

        let avg = report.avg_latency();
        assert!(avg >= Duration::from_millis(10), "{avg:?}");
        assert!(avg <= Duration::from_millis(12), "{avg:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_fifth_call_fails() {
        let config = sleep_op(100, 10, json!({ "latency_ms": 1, "fail_every": 5 }));
        let (worker, records) = build(config).await;

        let report = worker.run().await.unwrap();

        assert_eq!(report.success, 80);
        assert_eq!(report.errors, 20);
        assert_eq!(records.total_success(), 80);
        assert_eq!(records.total_errors(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remainder_is_not_executed() {
        let (worker, _) = build(sleep_op(103, 10, json!({ "latency_ms": 0 }))).await;
        let report = worker.run().await.unwrap();
        assert_eq!(report.ops, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_operations_count_once_per_result() {
        let config = sleep_op(40, 4, json!({ "latency_ms": 0, "batch": 5, "content_length": 10 }));
        let (worker, _) = build(config).await;

        let report = worker.run().await.unwrap();

        // 2 calls per lane, each reporting 5 operations
        assert_eq!(report.ops, 40);
        assert_eq!(report.success, 8);
        assert_eq!(report.bytes, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intervals_cover_every_result_once() {
        let config = sleep_op(200, 2, json!({ "latency_ms": 10 }))
            .with_interval(Duration::from_millis(100));
        let (worker, records) = build(config).await;

        let report = worker.run().await.unwrap();

        let emitted = records.records();
        assert!(emitted.len() >= 9, "{} records", emitted.len());
        assert_eq!(report.intervals, emitted.len());
        assert_eq!(records.total_success(), 200);
        assert!(emitted.iter().all(|r| r.throughput.is_finite()));
    }
}

mod shutdown_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_external_stop_mid_run() {
        let (worker, records) = build(sleep_op(10_000, 4, json!({ "latency_ms": 10 }))).await;
        let worker = Arc::new(worker);
        let stop = worker.stop_handle();

        let run = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run().await })
        };

        sleep(Duration::from_millis(105)).await;
        stop.stop().await;
        assert_eq!(stop.state(), Lifecycle::Finished);

        let report = run.await.unwrap().unwrap();
        assert!(report.ops >= 4 * 9, "{}", report.ops);
        assert!(report.ops <= 4 * 11, "{}", report.ops);
        assert_eq!(report.success, records.total_success());
        assert_eq!(records.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_double_stop_saves_once() {
        let (worker, records) = build(sleep_op(10_000, 4, json!({ "latency_ms": 5 }))).await;
        let worker = Arc::new(worker);

        let run = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run().await })
        };

        sleep(Duration::from_millis(50)).await;
        let first = worker.stop_handle();
        let second = worker.stop_handle();
        tokio::join!(first.stop(), second.stop());

        // Late and repeated stops are no-ops
        first.stop().await;

        run.await.unwrap().unwrap();
        assert_eq!(records.saves(), 1);
        assert_eq!(worker.state(), Lifecycle::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_trigger_stops_run() {
        let config = sleep_op(0, 2, json!({ "latency_ms": 10 }))
            .with_duration(Duration::from_millis(250));
        let (worker, records) = build(config).await;
        assert_eq!(worker.config().total, volley_core::UNBOUNDED_TOTAL);

        let start = Instant::now();
        let report = worker.run().await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
        assert!(report.ops >= 2 * 20, "{}", report.ops);
        assert!(report.ops <= 2 * 25, "{}", report.ops);
        assert_eq!(records.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_in_flight_calls() {
        let (registry, completed) = counting_registry(Duration::from_millis(10), None);
        let (sink, records) = MemorySink::new();
        let config = WorkerConfig::new("counting")
            .with_total(10_000)
            .with_concurrency(4);
        let worker = Arc::new(Worker::build(config, &registry, Box::new(sink)).await.unwrap());
        let stop = worker.stop_handle();

        let run = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run().await })
        };

        // Every lane is mid-call when the stop lands
        sleep(Duration::from_millis(105)).await;
        stop.stop().await;

        let report = run.await.unwrap().unwrap();
        let completed = completed.load(Ordering::SeqCst) as u64;
        assert_eq!(completed, 4 * 11);
        assert_eq!(report.ops, completed);
        assert_eq!(records.total_success(), completed);
        assert_eq!(records.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lane_panic_still_saves() {
        let (registry, completed) = counting_registry(Duration::from_millis(1), Some(2));
        let (sink, records) = MemorySink::new();
        let config = WorkerConfig::new("counting")
            .with_total(20)
            .with_concurrency(4);
        let worker = Worker::build(config, &registry, Box::new(sink)).await.unwrap();

        let report = worker.run().await.unwrap();

        // Lane 0 dies on its third call, the other three finish their five
        assert_eq!(completed.load(Ordering::SeqCst), 2 + 3 * 5);
        assert_eq!(report.ops, 17);
        assert_eq!(records.saves(), 1);
        assert_eq!(worker.state(), Lifecycle::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_finish_is_noop() {
        let (worker, records) = build(sleep_op(10, 2, json!({ "latency_ms": 1 }))).await;
        worker.run().await.unwrap();

        worker.stop_handle().stop().await;
        assert_eq!(records.saves(), 1);
    }
}

mod rate_limit_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_accuracy() {
        let config = sleep_op(300, 3, json!({ "latency_ms": 0 })).with_rate(50.0);
        let (worker, _) = build(config).await;

        let start = Instant::now();
        let report = worker.run().await.unwrap();
        let elapsed = start.elapsed();

        // 100 calls per lane at 50/s
        assert_eq!(report.ops, 300);
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unthrottled_run_is_fast() {
        let (worker, _) = build(sleep_op(300, 3, json!({ "latency_ms": 0 }))).await;

        let start = Instant::now();
        worker.run().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }
}

mod config_error_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_config_fails_before_start() {
        let registry = Registry::with_builtins();
        let (sink, records) = MemorySink::new();
        let config = sleep_op(5, 10, json!({}));

        let err = Worker::build(config, &registry, Box::new(sink))
            .await
            .unwrap_err();

        assert!(err.is_config());
        assert_eq!(records.saves(), 0);
    }
}
