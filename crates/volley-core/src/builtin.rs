//! Built-in synthetic operations

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use crate::error::OperationError;
use crate::operation::{config_value, OpResult, Operation, OperationConfig};

// ============================================================================
// SLEEP
// ============================================================================

/// Synthetic operation that sleeps for a fixed latency
///
/// Config keys (all optional):
///
/// | key              | type  | default | meaning                                  |
/// |------------------|-------|---------|------------------------------------------|
/// | `latency_ms`     | f64   | 1.0     | time spent in each call                  |
/// | `fail_every`     | u64   | 0       | every k-th call of the instance fails    |
/// | `content_length` | i64   | 0       | reported payload size                    |
/// | `batch`          | usize | 1       | logical operations reported per call     |
#[derive(Debug, Clone)]
pub struct SleepOperation {
    latency_ms: f64,
    fail_every: u64,
    content_length: i64,
    batch: usize,
    latency: Duration,
    calls: u64,
}

impl SleepOperation {
    pub const NAME: &'static str = "sleep";

    /// Registry factory
    pub fn factory(config: &OperationConfig) -> Result<Box<dyn Operation>, OperationError> {
        Ok(Box::new(Self::from_config(config)?))
    }

    pub fn from_config(config: &OperationConfig) -> Result<Self, OperationError> {
        Ok(Self {
            latency_ms: config_value(config, "latency_ms")?.unwrap_or(1.0),
            fail_every: config_value(config, "fail_every")?.unwrap_or(0),
            content_length: config_value(config, "content_length")?.unwrap_or(0),
            batch: config_value(config, "batch")?.unwrap_or(1),
            latency: Duration::ZERO,
            calls: 0,
        })
    }

    /// Calls issued by this instance
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

#[async_trait]
impl Operation for SleepOperation {
    async fn init(&mut self) -> Result<(), OperationError> {
        if !self.latency_ms.is_finite() || self.latency_ms < 0.0 {
            return Err(OperationError::InvalidValue {
                key: "latency_ms".to_string(),
                reason: format!("must be a non-negative number, got {}", self.latency_ms),
            });
        }
        if self.batch == 0 {
            return Err(OperationError::InvalidValue {
                key: "batch".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        self.latency = Duration::from_secs_f64(self.latency_ms / 1000.0);
        Ok(())
    }

    async fn call(&mut self, _base: usize, _index: usize, _n: usize) -> OpResult {
        let start = Instant::now();
        self.calls += 1;

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        if self.fail_every > 0 && self.calls % self.fail_every == 0 {
            return OpResult::failure(
                format!("synthetic failure on call {}", self.calls),
                start.elapsed(),
            )
            .with_count(self.batch);
        }

        OpResult::success(200, start.elapsed(), self.content_length).with_count(self.batch)
    }
}
