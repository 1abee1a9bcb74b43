//! Error types shared by every formsync crate.

use thiserror::Error;

/// Result type alias for formsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage-side failures, independent of the concrete database driver.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create connection pool: {0}")]
    PoolCreationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Top-level error for a sync run.
///
/// Every variant except `Json` maps to one class of the run-level taxonomy:
/// configuration and definition errors are raised before any table is touched,
/// transport errors abort the current run, schema errors abort after whatever
/// batches were already committed.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid caller input (missing token, empty table name, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed, empty or unbalanced form definition
    #[error("Form definition error: {0}")]
    Definition(String),

    /// Network failure or non-2xx response from the form API
    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// DDL failure (create table, add or drop column)
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// True for errors raised before any storage was touched.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Definition(_))
    }
}
