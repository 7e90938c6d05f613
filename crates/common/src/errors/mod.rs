//! Error types for the billflow pipeline
//!
//! Provides:
//! - Distinct error types for different failure modes
//! - Classification into transient / malformed / constraint / fatal,
//!   which drives retry and exit-status decisions in the binaries

use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure classes, machine-readable.
///
/// - `Transient`: retried with bounded backoff, then surfaced per entity.
/// - `Malformed`: the offending record is skipped and reported; the run
///   continues.
/// - `Constraint`: duplicate-key no-ops, treated as success.
/// - `Fatal`: aborts the run (missing schema, rejected credential,
///   unreachable store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Malformed,
    Constraint,
    Fatal,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Malformed record {key}: {message}")]
    MalformedRecord { key: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

// Postgres SQLSTATE codes that matter to classification
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
const SQLSTATE_QUERY_CANCELED: &str = "57014";
const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";
const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";
const SQLSTATE_INVALID_PASSWORD: &str = "28P01";
const SQLSTATE_INVALID_CATALOG: &str = "3D000";

impl AppError {
    /// Classify this error for retry and exit-status handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Database(e) => classify_sqlx(e),
            AppError::DatabaseConnection { .. } => ErrorClass::Fatal,
            AppError::MalformedRecord { .. } => ErrorClass::Malformed,
            AppError::Configuration { .. } => ErrorClass::Fatal,
            AppError::Serialization(_) => ErrorClass::Malformed,
            AppError::Io(_) => ErrorClass::Transient,
            AppError::Other(_) => ErrorClass::Fatal,
        }
    }

    /// True when a bounded retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

fn classify_sqlx(e: &sqlx::Error) -> ErrorClass {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Tls(_) => ErrorClass::Transient,
        sqlx::Error::PoolClosed | sqlx::Error::Configuration(_) => ErrorClass::Fatal,
        sqlx::Error::Database(db) => {
            if db.is_unique_violation() {
                return ErrorClass::Constraint;
            }
            match db.code().as_deref() {
                Some(SQLSTATE_SERIALIZATION_FAILURE)
                | Some(SQLSTATE_DEADLOCK_DETECTED)
                | Some(SQLSTATE_QUERY_CANCELED) => ErrorClass::Transient,
                Some(SQLSTATE_UNDEFINED_TABLE)
                | Some(SQLSTATE_INSUFFICIENT_PRIVILEGE)
                | Some(SQLSTATE_INVALID_PASSWORD)
                | Some(SQLSTATE_INVALID_CATALOG) => ErrorClass::Fatal,
                _ => ErrorClass::Fatal,
            }
        }
        _ => ErrorClass::Fatal,
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_classification() {
        let err = AppError::MalformedRecord {
            key: "INV-2".into(),
            message: "total is not a number".into(),
        };
        assert_eq!(err.class(), ErrorClass::Malformed);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.is_transient());
    }

    #[test]
    fn test_config_error_is_fatal() {
        let err = AppError::Configuration {
            message: "database.url missing".into(),
        };
        assert_eq!(err.class(), ErrorClass::Fatal);
    }
}
