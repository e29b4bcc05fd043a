//! Error types for the metastore data source.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Configuration problems are reported eagerly while building a pool; everything that
//! needs a live database is deferred to the first connection acquire.

use thiserror::Error;

/// Error raised while turning pool properties into a [`PoolConfig`](crate::models::PoolConfig).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Property {key} does not exist on the pool configuration")]
    Unknown { key: String },

    #[error("Invalid value '{value}' for property {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Cannot create {pooling_type} configuration: {source}")]
    Configuration {
        pooling_type: String,
        #[source]
        source: PropertyError,
    },

    #[error("Missing required configuration property: {key}")]
    MissingProperty { key: String },

    #[error("Invalid value '{value}' for configuration property {key}")]
    InvalidProperty { key: String, value: String },

    #[error("Unsupported connection pooling type: '{pooling_type}'")]
    UnsupportedPoolingType { pooling_type: String },

    #[error("Unsupported database: {product}. {reason}")]
    UnsupportedDatabase { product: String, reason: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Metrics registration failed: {message}")]
    Metrics { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Wrap a pool configuration construction failure.
    pub fn configuration(pooling_type: impl Into<String>, source: PropertyError) -> Self {
        Self::Configuration {
            pooling_type: pooling_type.into(),
            source,
        }
    }

    /// Create a missing property error.
    pub fn missing_property(key: impl Into<String>) -> Self {
        Self::MissingProperty { key: key.into() }
    }

    /// Create an invalid property error.
    pub fn invalid_property(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidProperty {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create an error for a pooling type no provider handles.
    pub fn unsupported_pooling_type(pooling_type: impl Into<String>) -> Self {
        Self::UnsupportedPoolingType {
            pooling_type: pooling_type.into(),
        }
    }

    /// Create an unsupported database error.
    pub fn unsupported_database(product: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedDatabase {
            product: product.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::UnsupportedPoolingType { .. } => {
                Some("Set datanucleus.connectionPoolingType=HikariCP")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the JDBC URL format and credentials",
            ),
            sqlx::Error::Database(db_err) => DbError::connection(
                db_err.message().to_string(),
                "Check the database user permissions and the connection init SQL",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 0),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Create a new data source")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<prometheus::Error> for DbError {
    fn from(err: prometheus::Error) -> Self {
        DbError::Metrics {
            message: err.to_string(),
        }
    }
}

/// Result type alias for data source operations.
pub type DbResult<T> = Result<T, DbError>;
