//! Worker pool configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolleyError};
use crate::operation::OperationConfig;
use crate::pool::DEFAULT_BUFFER_CAPACITY;

/// Total used for duration-bounded runs
pub const UNBOUNDED_TOTAL: usize = i32::MAX as usize;

/// Report intervals must be strictly longer than this
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Operations to issue across all lanes
    pub total: usize,

    /// Number of concurrent lanes
    pub concurrency: usize,

    /// Per-lane rate limit in calls per second (0 = unthrottled)
    pub rate: f64,

    /// Report interval
    #[serde(rename = "interval_ms", with = "crate::interim::millis")]
    pub interval: Duration,

    /// Wall-clock bound; when set `total` becomes unbounded
    #[serde(
        rename = "duration_ms",
        with = "opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,

    /// Registry name of the operation
    pub operation: String,

    /// Passed unmodified to the operation factory
    pub operation_config: OperationConfig,

    /// Pre-sized capacity of each lane's result buffer
    pub buffer_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            total: 200,
            concurrency: 50,
            rate: 0.0,
            interval: Duration::from_secs(1),
            duration: None,
            operation: String::new(),
            operation_config: OperationConfig::new(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl WorkerConfig {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = total;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_operation_config(mut self, config: OperationConfig) -> Self {
        self.operation_config = config;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Check the configuration before any lane is launched
    ///
    /// A duration-bounded run has its total replaced by [`UNBOUNDED_TOTAL`].
    pub fn validate(&mut self) -> Result<()> {
        if self.operation.trim().is_empty() {
            return Err(invalid("operation name must not be empty"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency must be at least 1"));
        }

        match self.duration {
            Some(duration) if duration.is_zero() => {
                return Err(invalid("duration must be positive"));
            }
            Some(_) => self.total = UNBOUNDED_TOTAL,
            None if self.total == 0 => {
                return Err(invalid("total must be at least 1"));
            }
            None => {}
        }

        if self.total < self.concurrency {
            return Err(invalid(format!(
                "total ({}) must not be less than concurrency ({})",
                self.total, self.concurrency
            )));
        }
        if self.interval <= MIN_INTERVAL {
            return Err(invalid(format!(
                "interval must be longer than {:?}, got {:?}",
                MIN_INTERVAL, self.interval
            )));
        }
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(invalid(format!(
                "rate must be a non-negative number, got {}",
                self.rate
            )));
        }
        Ok(())
    }

    /// Operations assigned to each lane; the remainder is not executed
    pub fn per_lane(&self) -> usize {
        self.total.checked_div(self.concurrency).unwrap_or(0)
    }

    /// Operations assigned across all lanes
    pub fn assigned(&self) -> usize {
        self.per_lane() * self.concurrency
    }
}

fn invalid(reason: impl Into<String>) -> VolleyError {
    VolleyError::InvalidConfig(reason.into())
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .map(|d| d.as_nanos() as f64 / 1_000_000.0)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        match Option::<f64>::deserialize(deserializer)? {
            None => Ok(None),
            Some(ms) if ms.is_finite() && ms >= 0.0 => {
                Ok(Some(Duration::from_nanos((ms * 1_000_000.0).round() as u64)))
            }
            Some(ms) => Err(serde::de::Error::custom(format!(
                "invalid duration: {ms} ms"
            ))),
        }
    }
}
