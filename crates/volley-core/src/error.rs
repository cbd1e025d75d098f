//! Error types for the load generation engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, VolleyError>;

/// Errors raised while configuring or driving a worker pool
///
/// Per-call failures of an [`Operation`](crate::Operation) are never surfaced
/// here; they travel inside [`OpResult::error`](crate::OpResult) and are
/// counted by the reporter.
#[derive(Error, Debug)]
pub enum VolleyError {
    // === Configuration ===
    /// Pool configuration rejected before any lane was launched
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation name not present in the registry
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// A factory is already registered under this name
    #[error("Operation already registered: {0}")]
    DuplicateOperation(String),

    /// Operation factory or `init` failed
    #[error("Operation {name} failed to initialize: {source}")]
    OperationInit {
        name: String,
        #[source]
        source: OperationError,
    },

    // === Lifecycle ===
    /// `run` was called on a pool that already left the configured state
    #[error("Worker pool already started")]
    AlreadyStarted,

    /// The reporter task ended without producing its final pass
    #[error("Reporter failed: {0}")]
    Reporter(String),

    // === Output ===
    /// The sink could not persist the run's records
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VolleyError {
    /// Configuration errors are fatal at startup; everything else happens mid-run
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::UnknownOperation(_)
                | Self::DuplicateOperation(_)
                | Self::OperationInit { .. }
        )
    }
}

/// Errors produced by operation factories and `Operation::init`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// A required configuration key is absent
    #[error("missing required config key `{0}`")]
    MissingKey(String),

    /// A configuration value could not be interpreted
    #[error("invalid config value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    /// Setup against the target failed
    #[error("setup failed: {0}")]
    Setup(String),
}

/// Errors produced by result sinks
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `save` was called a second time
    #[error("Sink already saved")]
    AlreadySaved,
}
