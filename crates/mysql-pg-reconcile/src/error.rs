//! Error types for the reconciliation library.

use thiserror::Error;

/// Process exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code when a store cannot be reached.
pub const EXIT_STORE_UNAVAILABLE: u8 = 2;
/// Process exit code when store output could not be interpreted.
pub const EXIT_PARSE_ERROR: u8 = 3;
/// Process exit code for a run that finished with row failures or a count mismatch.
pub const EXIT_DEGRADED: u8 = 4;
/// Process exit code for a cancelled run.
pub const EXIT_CANCELLED: u8 = 5;
/// Process exit code for a store call that exceeded its timeout.
pub const EXIT_TIMEOUT: u8 = 6;
/// Process exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for reconciliation operations.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Configuration error (invalid YAML, missing fields, bad table spec, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store process or connection could not be reached.
    #[error("Store {store} unavailable: {message}")]
    StoreUnavailable { store: String, message: String },

    /// A value cannot be represented safely in the target statement language.
    #[error("Cannot encode column {column}: {message}")]
    Encoding { column: String, message: String },

    /// The store rejected a statement.
    #[error("Statement rejected: {message}")]
    RowExecution { message: String },

    /// A store's textual result could not be interpreted.
    #[error("Unparseable output from {context}: {message}")]
    Parse { context: String, message: String },

    /// A store call did not return within the configured timeout.
    #[error("Store {store} did not answer within {seconds}s")]
    Timeout { store: String, seconds: u64 },

    /// IO error (file operations, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Create a StoreUnavailable error.
    pub fn unavailable(store: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ReconcileError::StoreUnavailable {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Create a RowExecution error carrying the store's error text.
    pub fn rejected(message: impl std::fmt::Display) -> Self {
        ReconcileError::RowExecution {
            message: message.to_string().trim().to_string(),
        }
    }

    /// Create a Parse error.
    pub fn parse(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ReconcileError::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an Encoding error.
    pub fn encoding(column: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ReconcileError::Encoding {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error only affects the row that produced it.
    ///
    /// Row-level errors are recorded in the batch result; everything else
    /// halts the run.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            ReconcileError::Encoding { .. }
                | ReconcileError::RowExecution { .. }
                | ReconcileError::Timeout { .. }
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReconcileError::Config(_) | ReconcileError::Yaml(_) => EXIT_CONFIG_ERROR,
            ReconcileError::StoreUnavailable { .. } => EXIT_STORE_UNAVAILABLE,
            ReconcileError::Parse { .. } | ReconcileError::Csv(_) => EXIT_PARSE_ERROR,
            ReconcileError::Encoding { .. } | ReconcileError::RowExecution { .. } => EXIT_DEGRADED,
            ReconcileError::Cancelled => EXIT_CANCELLED,
            ReconcileError::Timeout { .. } => EXIT_TIMEOUT,
            ReconcileError::Io(_) | ReconcileError::Json(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
