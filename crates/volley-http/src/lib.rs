//! # Volley HTTP
//!
//! HTTP request operation for the Volley load generator.
//!
//! ```no_run
//! use volley_core::Registry;
//!
//! let registry = Registry::with_builtins();
//! volley_http::register(&registry).expect("http registers once");
//! assert!(registry.contains("http"));
//! ```

pub mod config;
pub mod operation;

pub use config::{HttpConfig, HttpError};
pub use operation::HttpOperation;

use volley_core::{Registry, Result};

/// Register the `http` operation
pub fn register(registry: &Registry) -> Result<()> {
    registry.register(HttpOperation::NAME, HttpOperation::factory)
}
