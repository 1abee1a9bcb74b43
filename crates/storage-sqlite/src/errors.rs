//! Storage errors and their mapping onto the core error type.

use formsync_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Failed to create connection pool: {0}")]
    PoolCreation(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// DDL failures abort a run as schema errors rather than database errors.
    pub fn into_schema(self) -> Error {
        Error::schema(self.to_string())
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let db_err = match err {
            StorageError::Query(e) => DatabaseError::QueryFailed(e.to_string()),
            StorageError::Connection(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Pool(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::PoolCreation(msg) => DatabaseError::PoolCreationFailed(msg),
            StorageError::Migration(msg) => DatabaseError::MigrationFailed(msg),
            StorageError::Sqlite(e) => DatabaseError::Internal(e.to_string()),
            StorageError::Io(e) => DatabaseError::Internal(e.to_string()),
        };
        Error::Database(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_become_database_errors() {
        let err: Error = StorageError::from(diesel::result::Error::NotFound).into();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::QueryFailed(_))
        ));
    }

    #[test]
    fn ddl_errors_become_schema_errors() {
        let err = StorageError::Migration("boom".into()).into_schema();
        assert!(matches!(err, Error::Schema(ref msg) if msg.contains("boom")));
    }
}
