//! Error types for the data-access engine.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every error carries a coarse [`ErrorKind`] so that callers (most importantly the
//! transaction wrapper) can branch on the category of failure instead of on the
//! concrete variant.

use thiserror::Error;

/// Boxed driver-level cause kept on data access failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DaoError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Data access error: {message}")]
    DataAccess {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<DaoError>>,
    },

    #[error("Conversion warning: {message}")]
    Conversion { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },
}

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Native database or driver failure; always escalates.
    DataAccess,
    /// Unknown data source, missing driver support, unresolvable procedure.
    Configuration,
    /// Failure raised while a transactional block ran.
    Transaction,
    /// Non-fatal row mapping problem; never escapes the converter.
    Conversion,
}

impl DaoError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a data access error without an underlying cause.
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess {
            message: message.into(),
            sql_state: None,
            source: None,
        }
    }

    /// Create a data access error that keeps the originating cause.
    pub fn data_access_caused_by(
        message: impl Into<String>,
        sql_state: Option<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::DataAccess {
            message: message.into(),
            sql_state,
            source: Some(source.into()),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap the failure of a transactional block.
    ///
    /// Errors that already are transaction errors pass through unchanged.
    pub fn transaction_failed(cause: DaoError) -> Self {
        if cause.kind() == ErrorKind::Transaction {
            return cause;
        }
        Self::Transaction {
            message: format!("transaction rolled back: {cause}"),
            source: Some(Box::new(cause)),
        }
    }

    /// Create a conversion warning.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::DataAccess { .. } | Self::Timeout { .. } => {
                ErrorKind::DataAccess
            }
            Self::Configuration { .. } | Self::InvalidInput { .. } => ErrorKind::Configuration,
            Self::Transaction { .. } => ErrorKind::Transaction,
            Self::Conversion { .. } => ErrorKind::Conversion,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// SQLSTATE reported by the database, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::DataAccess { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DaoError, keeping the driver error as the cause.
impl From<sqlx::Error> for DaoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Configuration(msg) => DaoError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let message = db_err.message().to_string();
                DaoError::data_access_caused_by(message, code, err)
            }
            sqlx::Error::PoolTimedOut => DaoError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DaoError::connection("Connection pool is closed", "Register the data source again")
            }
            sqlx::Error::Io(io_err) => DaoError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DaoError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DaoError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::RowNotFound => DaoError::data_access("No rows returned"),
            _ => {
                let message = err.to_string();
                DaoError::data_access_caused_by(message, None, err)
            }
        }
    }
}

/// Result type alias for engine operations.
pub type DaoResult<T> = Result<T, DaoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = DaoError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = DaoError::configuration("Unknown data source 'x'");
        assert_eq!(err.to_string(), "Configuration error: Unknown data source 'x'");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(DaoError::data_access("boom").kind(), ErrorKind::DataAccess);
        assert_eq!(DaoError::timeout("query", 30).kind(), ErrorKind::DataAccess);
        assert_eq!(
            DaoError::invalid_input("bad").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(DaoError::transaction("x").kind(), ErrorKind::Transaction);
        assert_eq!(DaoError::conversion("x").kind(), ErrorKind::Conversion);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DaoError::timeout("query", 30).is_retryable());
        assert!(DaoError::connection("err", "sugg").is_retryable());
        assert!(!DaoError::configuration("missing driver").is_retryable());
    }

    #[test]
    fn test_transaction_failed_wraps_cause() {
        let err = DaoError::transaction_failed(DaoError::data_access("constraint violated"));
        assert_eq!(err.kind(), ErrorKind::Transaction);
        assert!(err.to_string().contains("constraint violated"));
        let source = err.source().expect("cause should be kept");
        assert!(source.to_string().contains("constraint violated"));
    }

    #[test]
    fn test_transaction_failed_passes_through_transaction_errors() {
        let err = DaoError::transaction_failed(DaoError::transaction("forced rollback"));
        assert_eq!(err.to_string(), "Transaction error: forced rollback");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_data_access_keeps_cause() {
        let io = std::io::Error::other("socket closed");
        let err = DaoError::data_access_caused_by("query failed", Some("08006".into()), io);
        assert_eq!(err.sql_state(), Some("08006"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_data_access() {
        let err: DaoError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::DataAccess);
    }
}
