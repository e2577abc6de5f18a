//! Error types for the PostgreSQL store.

use reelcheck_core::ReelcheckError;
use thiserror::Error;

/// Errors that can occur when interacting with PostgreSQL.
#[derive(Debug, Error)]
pub enum PgStoreError {
    /// Database connection failed
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// SQL query execution failed
    #[error("Query error: {0}")]
    Query(String),

    /// Stored rows contradict the ledger invariants
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl From<sqlx::Error> for PgStoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(e.to_string())
            }
            _ => Self::Query(e.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for PgStoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Migration(e.to_string())
    }
}

impl From<PgStoreError> for ReelcheckError {
    fn from(e: PgStoreError) -> Self {
        match e {
            PgStoreError::Invariant(msg) => ReelcheckError::InvariantViolation(msg),
            other => ReelcheckError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_into_engine_errors() {
        let err: ReelcheckError = PgStoreError::Query("deadlock detected".into()).into();
        assert!(err.is_retryable());

        let err: ReelcheckError = PgStoreError::Invariant("double canonical".into()).into();
        assert!(matches!(err, ReelcheckError::InvariantViolation(_)));
    }

    #[test]
    fn test_pool_timeout_is_connection_error() {
        assert!(matches!(
            PgStoreError::from(sqlx::Error::PoolTimedOut),
            PgStoreError::Connection(_)
        ));
    }
}
