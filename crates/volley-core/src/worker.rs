//! # Worker pool
//!
//! A [`Worker`] owns `concurrency` [`Cell`]s and one reporter task. Each lane
//! is assigned `total / concurrency` operations; the remainder is not run.
//!
//! ```text
//!                  ┌──────────── Worker::run ────────────┐
//!                  │                                     │
//!   lane 0 ──┐     │   reporter: tick ──► drain cells    │
//!   lane 1 ──┼──►  │              │         │            │
//!   lane N ──┘     │   stop ──────┘    Interim::finalize │
//!                  │                        │            │
//!                  │                   Sink::write       │
//!                  └─────────────────────────────────────┘
//! ```
//!
//! ## Shutdown
//!
//! Natural completion, [`StopHandle::stop`] and the duration timer all take
//! the same path. The first caller to move the lifecycle from `Running` to
//! `Stopping` spawns the teardown: stop every cell, wait for the lanes to
//! return from their in-flight calls, raise the shared stop signal, await the
//! reporter's final pass, then call [`Sink::save`]. Every other caller waits
//! until the lifecycle reaches `Finished`, so teardown and `save` run exactly
//! once and the final pass sees every result a lane produced.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cell::Cell;
use crate::config::WorkerConfig;
use crate::error::{OperationError, Result, VolleyError};
use crate::interim::{Finalize, Interim};
use crate::pool::ResultPool;
use crate::registry::Registry;
use crate::sink::Sink;

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Worker pool lifecycle; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Configured = 0,
    Running = 1,
    Stopping = 2,
    Finished = 3,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Configured,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Finished,
        }
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

/// Whole-run totals accumulated by the reporter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Logical operations processed
    pub ops: u64,
    pub success: u64,
    pub errors: u64,
    pub bytes: u64,

    /// Records handed to the sink
    pub intervals: usize,

    /// Wall time from reporter start to its final pass
    #[serde(rename = "elapsed_ms", with = "crate::interim::millis")]
    pub elapsed: Duration,

    #[serde(rename = "latency_total_ms", with = "crate::interim::millis")]
    latency_total: Duration,
}

impl RunReport {
    /// Overall operations per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.ops as f64 / secs
        } else {
            0.0
        }
    }

    /// Mean latency of successful operations across the run
    pub fn avg_latency(&self) -> Duration {
        if self.success == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.latency_total.as_nanos() / u128::from(self.success)) as u64)
    }

    fn absorb(&mut self, ops: u64, record: &Finalize) {
        self.ops += ops;
        self.success += record.success;
        self.errors += record.errors;
        self.bytes += record.bytes;
        let nanos = record.avg_latency.as_nanos() * u128::from(record.success);
        self.latency_total += Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64);
        self.intervals += 1;
    }
}

// ============================================================================
// WORKER
// ============================================================================

/// State shared between the pool, its stop handles and the teardown task
struct Shared {
    state: AtomicU8,
    /// Set once `run` has claimed the sink
    started: AtomicBool,
    cells: Vec<Arc<Cell>>,
    /// Lanes whose task has not returned yet
    active: watch::Sender<usize>,
    stop: watch::Sender<bool>,
    finished: watch::Sender<bool>,
    reporter: Mutex<Option<JoinHandle<(Box<dyn Sink>, RunReport)>>>,
    report: Mutex<Option<RunReport>>,
    outcome: Mutex<Option<Result<RunReport>>>,
}

impl Shared {
    fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    fn stop_cells(&self) {
        for cell in &self.cells {
            cell.stop();
        }
    }

    /// Stop every cell and the reporter's wait
    fn raise(&self) {
        self.stop_cells();
        self.stop.send_replace(true);
    }

    /// Single entry point for every stop trigger
    async fn shutdown(self: &Arc<Self>) {
        match self.state.compare_exchange(
            Lifecycle::Running as u8,
            Lifecycle::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                info!("Stopping worker pool");
                let shared = self.clone();
                tokio::spawn(async move { shared.teardown().await });
            }
            Err(state) if state == Lifecycle::Configured as u8 => {
                debug!("Stop requested before start");
                self.raise();
                // A `run` that already claimed the sink reaches teardown on its own
                if !self.started.load(Ordering::SeqCst) {
                    return;
                }
            }
            Err(_) => {}
        }

        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    async fn teardown(&self) {
        self.stop_cells();

        // Lanes finish their current call and push its result first
        let mut active = self.active.subscribe();
        let _ = active.wait_for(|lanes| *lanes == 0).await;
        self.stop.send_replace(true);

        let reporter = self.reporter.lock().take();
        let outcome = match reporter {
            Some(reporter) => match reporter.await {
                Ok((mut sink, report)) => {
                    *self.report.lock() = Some(report.clone());
                    match sink.save() {
                        Ok(()) => Ok(report),
                        Err(e) => {
                            error!("Failed to save results: {}", e);
                            Err(VolleyError::Sink(e))
                        }
                    }
                }
                Err(e) => {
                    error!("Reporter task failed: {}", e);
                    Err(VolleyError::Reporter(e.to_string()))
                }
            },
            None => Err(VolleyError::Reporter("reporter was never started".to_string())),
        };

        *self.outcome.lock() = Some(outcome);
        self.state.store(Lifecycle::Finished as u8, Ordering::Release);
        self.finished.send_replace(true);
        info!("Worker pool finished");
    }
}

/// Pool of concurrent lanes driving one registered operation
pub struct Worker {
    config: WorkerConfig,
    pool: Arc<ResultPool>,
    sink: Mutex<Option<Box<dyn Sink>>>,
    shared: Arc<Shared>,
}

/// Cloneable external stop trigger for a [`Worker`]
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Stop the pool and wait for teardown to finish
    ///
    /// Idempotent and safe to call concurrently with natural completion.
    /// Before the pool is started this only raises the stop signal, making a
    /// later `run` finish without issuing calls.
    pub async fn stop(&self) {
        self.shared.shutdown().await;
    }

    pub fn state(&self) -> Lifecycle {
        self.shared.state()
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("state", &self.state())
            .finish()
    }
}

impl Worker {
    /// Validate `config`, then create and initialize one operation per lane
    pub async fn build(
        mut config: WorkerConfig,
        registry: &Registry,
        sink: Box<dyn Sink>,
    ) -> Result<Self> {
        config.validate()?;

        let factory = registry
            .get(&config.operation)
            .ok_or_else(|| VolleyError::UnknownOperation(config.operation.clone()))?;

        let pool = Arc::new(ResultPool::new(config.buffer_capacity));
        let mut cells = Vec::with_capacity(config.concurrency);
        for index in 0..config.concurrency {
            let init_error = |source: OperationError| VolleyError::OperationInit {
                name: config.operation.clone(),
                source,
            };
            let mut operation = factory(&config.operation_config).map_err(init_error)?;
            operation.init().await.map_err(init_error)?;
            cells.push(Arc::new(Cell::new(index, config.rate, operation, pool.clone())));
        }

        debug!(
            "Built worker pool: {} lanes of {}",
            cells.len(),
            config.operation
        );

        let (stop, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);
        let (active, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            state: AtomicU8::new(Lifecycle::Configured as u8),
            started: AtomicBool::new(false),
            cells,
            active,
            stop,
            finished,
            reporter: Mutex::new(None),
            report: Mutex::new(None),
            outcome: Mutex::new(None),
        });

        Ok(Self {
            config,
            pool,
            sink: Mutex::new(Some(sink)),
            shared,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> Lifecycle {
        self.shared.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: self.shared.clone(),
        }
    }

    /// Totals of the finished run, available even when saving failed
    pub fn report(&self) -> Option<RunReport> {
        self.shared.report.lock().clone()
    }

    /// Run every lane to completion (or until stopped) and tear down
    ///
    /// May be called once; later calls fail with [`VolleyError::AlreadyStarted`].
    pub async fn run(&self) -> Result<RunReport> {
        let sink = self.sink.lock().take().ok_or(VolleyError::AlreadyStarted)?;
        self.shared.started.store(true, Ordering::SeqCst);
        let per_lane = self.config.per_lane();

        info!(
            "Starting worker pool: {} lanes x {} operations of {}",
            self.shared.cells.len(),
            per_lane,
            self.config.operation
        );

        let reporter = tokio::spawn(run_reporter(
            self.shared.cells.clone(),
            self.pool.clone(),
            sink,
            self.config.interval,
            self.shared.stop.subscribe(),
        ));
        *self.shared.reporter.lock() = Some(reporter);
        self.shared.active.send_replace(self.shared.cells.len());
        self.shared
            .state
            .store(Lifecycle::Running as u8, Ordering::SeqCst);

        let timer = self.config.duration.map(|duration| {
            let handle = self.stop_handle();
            tokio::spawn(async move {
                sleep(duration).await;
                info!("Run duration of {:?} elapsed", duration);
                handle.stop().await;
            })
        });

        let lanes: Vec<JoinHandle<usize>> = self
            .shared
            .cells
            .iter()
            .map(|cell| {
                let cell = cell.clone();
                let guard = LaneGuard(self.shared.clone());
                tokio::spawn(async move {
                    let _guard = guard;
                    cell.run(per_lane).await
                })
            })
            .collect();

        let mut completed = 0;
        for (index, lane) in join_all(lanes).await.into_iter().enumerate() {
            match lane {
                Ok(ops) => completed += ops,
                Err(e) => warn!("Lane {} terminated abnormally: {}", index, e),
            }
        }
        debug!("All lanes returned after {} operations", completed);

        self.shared.shutdown().await;
        if let Some(timer) = timer {
            timer.abort();
        }

        self.shared
            .outcome
            .lock()
            .take()
            .unwrap_or(Err(VolleyError::AlreadyStarted))
    }
}

/// Marks a lane as returned, including when its task panics
struct LaneGuard(Arc<Shared>);

impl Drop for LaneGuard {
    fn drop(&mut self) {
        self.0.active.send_modify(|lanes| *lanes = lanes.saturating_sub(1));
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// REPORTER
// ============================================================================

/// Periodic collection loop; returns the sink and run totals after its final pass
async fn run_reporter(
    cells: Vec<Arc<Cell>>,
    pool: Arc<ResultPool>,
    mut sink: Box<dyn Sink>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> (Box<dyn Sink>, RunReport) {
    let started = Instant::now();
    let mut last = started;
    let mut ticker = interval_at(started + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut interim = Interim::new();
    let mut totals = RunReport::default();

    loop {
        let stopping = tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => true,
            _ = ticker.tick() => false,
        };

        for cell in &cells {
            let drained = cell.reset();
            interim.record_all(&drained);
            pool.release(drained);
        }

        let now = Instant::now();
        let ops = interim.ops();
        let record = interim.finalize(now - last);
        last = now;
        interim.reset();

        info!(
            "tps={:.1} avg={:?} success={} errors={} p50={:?} p99={:?}",
            record.throughput,
            record.avg_latency,
            record.success,
            record.errors,
            record.percentiles.p50,
            record.percentiles.p99
        );

        totals.absorb(ops, &record);
        if let Err(e) = sink.write(&record) {
            warn!("Failed to write interval record: {}", e);
        }

        if stopping {
            break;
        }
    }

    totals.elapsed = started.elapsed();
    debug!("Reporter finished after {} intervals", totals.intervals);
    (sink, totals)
}
