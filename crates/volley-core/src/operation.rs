//! # Operation capability
//!
//! An [`Operation`] is one opaque unit of load-generation work. The engine never
//! looks inside it; it only needs a uniform [`OpResult`] back from every call.
//!
//! Each lane owns its own operation instance, so implementations may keep
//! mutable per-lane state (connections, counters) without synchronization.
//! The pool never cancels an in-flight call: implementations that talk to a
//! network must enforce their own timeouts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::OperationError;

/// Opaque key-value configuration handed to an operation factory unmodified
pub type OperationConfig = Map<String, Value>;

/// Factory registered under a name in the [`Registry`](crate::Registry)
pub type OperationFactory =
    Arc<dyn Fn(&OperationConfig) -> Result<Box<dyn Operation>, OperationError> + Send + Sync>;

/// Trait implemented by operation providers
#[async_trait]
pub trait Operation: Send {
    /// One-time setup, called once per instance before the first `call`
    async fn init(&mut self) -> Result<(), OperationError>;

    /// Perform one unit of work
    ///
    /// `base` is the lane index, `index` the lane-local progress counter and
    /// `n` the number of operations assigned to the lane.
    async fn call(&mut self, base: usize, index: usize, n: usize) -> OpResult;
}

/// Outcome of a single operation call
#[derive(Debug, Clone, PartialEq)]
pub struct OpResult {
    /// Failure cause, `None` on success
    pub error: Option<String>,

    /// Protocol status code (0 when not applicable)
    pub status_code: i32,

    /// Wall time spent in the call
    pub duration: Duration,

    /// Payload size in bytes, negative when unknown
    pub content_length: i64,

    /// Logical operations represented by this result
    pub count: usize,
}

impl OpResult {
    /// Successful single operation
    pub fn success(status_code: i32, duration: Duration, content_length: i64) -> Self {
        Self {
            error: None,
            status_code,
            duration,
            content_length,
            count: 1,
        }
    }

    /// Failed single operation
    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            error: Some(error.into()),
            status_code: 0,
            duration,
            content_length: -1,
            count: 1,
        }
    }

    /// Mark this result as covering `count` batched operations
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Operations this result accounts for; zero is treated as one
    pub fn ops(&self) -> u64 {
        self.count.max(1) as u64
    }
}

impl Default for OpResult {
    fn default() -> Self {
        Self::success(0, Duration::ZERO, 0)
    }
}

/// Read an optional key from an operation config, mapping type errors
pub fn config_value<T: serde::de::DeserializeOwned>(
    config: &OperationConfig,
    key: &str,
) -> Result<Option<T>, OperationError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| OperationError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}
