//! # Worker lane
//!
//! A [`Cell`] drives one operation instance through a bounded number of calls,
//! optionally throttled to a fixed rate, and buffers every result until the
//! reporter drains it.
//!
//! ```text
//!   lane task ──call()──► OpResult ──push──► [ results (mutex) ] ◄──reset()── reporter
//!        ▲                                                              │
//!        └──────────── stop signal (watch, one-shot) ◄───── pool teardown
//! ```
//!
//! The stop signal is cooperative: it is checked before every call (and while
//! waiting on the throttle), an in-flight call always completes and its result
//! is kept for the next drain.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::operation::Operation;
use crate::pool::{ResultBuffer, ResultPool};

/// One concurrent execution unit of the worker pool
pub struct Cell {
    index: usize,
    rate: f64,
    operation: tokio::sync::Mutex<Box<dyn Operation>>,
    results: Mutex<ResultBuffer>,
    pool: Arc<ResultPool>,
    stop: watch::Sender<bool>,
}

impl Cell {
    /// Create lane `index` issuing at most `rate` calls per second (`<= 0` means unthrottled)
    pub fn new(
        index: usize,
        rate: f64,
        operation: Box<dyn Operation>,
        pool: Arc<ResultPool>,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            index,
            rate,
            operation: tokio::sync::Mutex::new(operation),
            results: Mutex::new(pool.acquire()),
            pool,
            stop,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Issue up to `n` operation calls
    ///
    /// The loop counter advances by each result's `count`, so batched
    /// operations consume their share of the budget. Returns the number of
    /// logical operations completed.
    pub async fn run(&self, n: usize) -> usize {
        let mut stop = self.stop.subscribe();
        let mut throttle = self.throttle();
        let mut operation = self.operation.lock().await;

        debug!("Lane {} starting: {} operations", self.index, n);

        let mut i = 0;
        while i < n {
            if *stop.borrow() {
                debug!("Lane {} stopped after {} operations", self.index, i);
                return i;
            }

            if let Some(throttle) = throttle.as_mut() {
                tokio::select! {
                    biased;
                    _ = stop.wait_for(|stopped| *stopped) => {
                        debug!("Lane {} stopped after {} operations", self.index, i);
                        return i;
                    }
                    _ = throttle.tick() => {}
                }
            }

            let result = operation.call(self.index, i, n).await;
            i += result.count.max(1);
            self.results.lock().push(result);
        }

        debug!("Lane {} finished {} operations", self.index, i);
        i
    }

    /// Signal the lane to stop before its next call
    ///
    /// Safe to call any number of times; returns `true` only for the call that
    /// actually raised the signal.
    pub fn stop(&self) -> bool {
        !self.stop.send_replace(true)
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Swap the buffered results for a fresh pooled buffer
    ///
    /// The swap happens under the same lock as appends, so every result ends
    /// up in exactly one drained buffer.
    pub fn reset(&self) -> ResultBuffer {
        let fresh = self.pool.acquire();
        std::mem::replace(&mut *self.results.lock(), fresh)
    }

    /// Results buffered since the last `reset`
    pub fn pending(&self) -> usize {
        self.results.lock().len()
    }

    fn throttle(&self) -> Option<Interval> {
        if self.rate <= 0.0 {
            return None;
        }
        let micros = (1_000_000.0 / self.rate).max(1.0) as u64;
        let period = Duration::from_micros(micros);
        let mut throttle = interval_at(Instant::now() + period, period);
        throttle.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Some(throttle)
    }
}

impl Drop for Cell {
    fn drop(&mut self) {
        let buffer = std::mem::take(self.results.get_mut());
        self.pool.release(buffer);
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("index", &self.index)
            .field("rate", &self.rate)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
