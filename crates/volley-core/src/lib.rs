//! # Volley Core
//!
//! Concurrency and measurement engine for load generation.
//!
//! A [`Worker`] drives a fixed number of concurrent lanes ([`Cell`]s), each
//! repeatedly calling an opaque [`Operation`] resolved by name from a
//! [`Registry`]. A reporter task periodically drains every lane's buffered
//! [`OpResult`]s, reduces them with an [`Interim`] accumulator and hands one
//! [`Finalize`] summary per interval to a [`Sink`].
//!
//! ```text
//!   Registry ──factory──► Operation (one per lane)
//!                              │
//!                         Cell::run ──► result buffer ◄── ResultPool
//!                                            │
//!                      reporter: drain ──► Interim ──► Finalize ──► Sink
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use volley_core::prelude::*;
//!
//! # async fn example() -> volley_core::Result<()> {
//! let registry = Registry::with_builtins();
//! let (sink, records) = MemorySink::new();
//! let config = WorkerConfig::new("sleep").with_total(100).with_concurrency(10);
//!
//! let worker = Worker::build(config, &registry, Box::new(sink)).await?;
//! let report = worker.run().await?;
//! assert_eq!(report.ops, 100);
//! assert_eq!(records.saves(), 1);
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod cell;
pub mod config;
pub mod error;
pub mod interim;
pub mod operation;
pub mod pool;
pub mod registry;
pub mod sink;
pub mod worker;

pub use builtin::*;
pub use cell::*;
pub use config::*;
pub use error::*;
pub use interim::*;
pub use operation::*;
pub use pool::*;
pub use registry::*;
pub use sink::*;
pub use worker::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::WorkerConfig;
    pub use crate::error::{OperationError, Result, SinkError, VolleyError};
    pub use crate::interim::{Finalize, Percentiles};
    pub use crate::operation::{OpResult, Operation, OperationConfig};
    pub use crate::registry::Registry;
    pub use crate::sink::{CsvSink, JsonLinesSink, MemorySink, Sink};
    pub use crate::worker::{Lifecycle, RunReport, StopHandle, Worker};
}
