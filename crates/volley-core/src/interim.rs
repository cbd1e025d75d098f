//! # Interval statistics
//!
//! [`Interim`] accumulates the results drained during one reporting interval
//! and reduces them into an immutable [`Finalize`] record: throughput, average
//! latency, success/error counts, byte totals and tail-latency percentiles.
//!
//! ## Accounting rules
//!
//! - every result adds its `count` to the operation total (zero counts as one)
//! - failed results only bump the error count
//! - successful results add their duration to the latency sum, push a latency
//!   sample and add a positive content length to the byte total
//! - once `MAX_SAMPLES` samples are held, further samples are dropped; sums
//!   and counts stay exact, only percentile fidelity degrades
//!
//! ## Percentiles
//!
//! Samples are sorted ascending, then the value for percentile `p` is the
//! first sample at index `i` with `i * 100 / len >= p` (the last sample when no
//! such index exists).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::OpResult;

/// Maximum latency samples held per interval
pub const MAX_SAMPLES: usize = 10_000_000;

/// Initial sample capacity
const INITIAL_SAMPLES: usize = 4096;

/// Percentiles reported in every [`Finalize`] record
pub const PERCENTILES: [u64; 7] = [10, 25, 50, 75, 90, 95, 99];

/// Per-interval accumulator
#[derive(Debug, Clone)]
pub struct Interim {
    latency_total: Duration,
    samples: Vec<Duration>,
    max_samples: usize,
    ops: u64,
    success: u64,
    errors: u64,
    bytes: u64,
}

impl Interim {
    pub fn new() -> Self {
        Self::with_max_samples(MAX_SAMPLES)
    }

    /// Accumulator holding at most `max_samples` latency samples
    pub fn with_max_samples(max_samples: usize) -> Self {
        Self {
            latency_total: Duration::ZERO,
            samples: Vec::with_capacity(INITIAL_SAMPLES.min(max_samples)),
            max_samples,
            ops: 0,
            success: 0,
            errors: 0,
            bytes: 0,
        }
    }

    /// Fold one result into the interval
    pub fn record(&mut self, result: &OpResult) {
        self.ops += result.ops();

        if !result.is_success() {
            self.errors += 1;
            return;
        }

        self.success += 1;
        self.latency_total += result.duration;
        if self.samples.len() < self.max_samples {
            self.samples.push(result.duration);
        }
        if result.content_length > 0 {
            self.bytes += result.content_length as u64;
        }
    }

    /// Fold a drained buffer into the interval, in buffer order
    pub fn record_all(&mut self, results: &[OpResult]) {
        results.iter().for_each(|r| self.record(r));
    }

    /// Reduce the interval into a summary record
    ///
    /// `elapsed` is the wall time since the previous collection pass.
    pub fn finalize(&mut self, elapsed: Duration) -> Finalize {
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            self.ops as f64 / secs
        } else {
            0.0
        };

        let avg_latency = if self.success > 0 {
            let nanos = self.latency_total.as_nanos() / u128::from(self.success);
            Duration::from_nanos(nanos as u64)
        } else {
            Duration::ZERO
        };

        self.samples.sort_unstable();

        Finalize {
            timestamp: Utc::now(),
            throughput,
            avg_latency,
            success: self.success,
            errors: self.errors,
            bytes: self.bytes,
            percentiles: Percentiles::from_sorted(&self.samples),
        }
    }

    /// Return to the zero state, keeping the sample allocation
    pub fn reset(&mut self) {
        self.samples.clear();
        self.latency_total = Duration::ZERO;
        self.ops = 0;
        self.success = 0;
        self.errors = 0;
        self.bytes = 0;
    }

    pub fn ops(&self) -> u64 {
        self.ops
    }

    pub fn success(&self) -> u64 {
        self.success
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Latency samples currently held
    pub fn samples(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops == 0
    }
}

impl Default for Interim {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one reporting interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finalize {
    pub timestamp: DateTime<Utc>,

    /// Operations per second over the interval
    pub throughput: f64,

    /// Mean latency of successful operations
    #[serde(rename = "avg_latency_ms", with = "millis")]
    pub avg_latency: Duration,

    pub success: u64,
    pub errors: u64,

    /// Sum of positive content lengths of successful operations
    pub bytes: u64,

    pub percentiles: Percentiles,
}

/// Tail-latency values for one interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percentiles {
    #[serde(with = "millis")]
    pub p10: Duration,
    #[serde(with = "millis")]
    pub p25: Duration,
    #[serde(with = "millis")]
    pub p50: Duration,
    #[serde(with = "millis")]
    pub p75: Duration,
    #[serde(with = "millis")]
    pub p90: Duration,
    #[serde(with = "millis")]
    pub p95: Duration,
    #[serde(with = "millis")]
    pub p99: Duration,
}

impl Percentiles {
    /// Read percentiles off an ascending sample slice; zeros when empty
    pub fn from_sorted(samples: &[Duration]) -> Self {
        let at = |p| percentile_index(samples.len(), p).map_or(Duration::ZERO, |i| samples[i]);
        Self {
            p10: at(10),
            p25: at(25),
            p50: at(50),
            p75: at(75),
            p90: at(90),
            p95: at(95),
            p99: at(99),
        }
    }

    /// Values in [`PERCENTILES`] order
    pub fn values(&self) -> [Duration; 7] {
        [
            self.p10, self.p25, self.p50, self.p75, self.p90, self.p95, self.p99,
        ]
    }
}

/// Index of the first sample with `i * 100 / len >= p`, clamped to the last one
pub fn percentile_index(len: usize, p: u64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let len64 = len as u64;
    let first = (p * len64).div_ceil(100) as usize;
    Some(first.min(len - 1))
}

/// Serialize durations as floating-point milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(serde::de::Error::custom(format!("invalid latency: {ms}")));
        }
        Ok(Duration::from_nanos((ms * 1_000_000.0).round() as u64))
    }
}
