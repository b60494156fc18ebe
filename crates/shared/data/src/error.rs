//! Engine-level errors.
//!
//! Configuration mistakes surface when a mapping or storage context is built.
//! Driver failures are carried through untouched so callers see the original
//! cause after the enclosing transaction has been rolled back.

use thiserror::Error;

/// Errors raised by the mapping, command and unit-of-work machinery.
#[derive(Error, Debug)]
pub enum DataError {
    /// Invalid or missing entity configuration, provider or connection string
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller passed an argument the operation cannot work with
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Operation attempted on a torn-down resource
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    /// The handler for this entity type deliberately does not implement the mutation
    #[error("{operation} is not supported for {entity}")]
    Unsupported {
        entity: &'static str,
        operation: &'static str,
    },

    /// A driver value could not be converted to the mapped property type
    #[error("Cannot convert {found} to {expected} for {property}")]
    Conversion {
        property: String,
        expected: String,
        found: String,
    },

    /// Connection state problem (not open, already closed, ...)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction lifecycle problem (nested begin, unknown handle, ...)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Failure reported by a connection implementation
    #[error("Driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[cfg(feature = "sea-orm")]
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Result type alias
pub type DataResult<T> = Result<T, DataError>;

/// Convenience constructors
impl DataError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        DataError::Configuration(msg.into())
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        DataError::Argument(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        DataError::Connection(msg.into())
    }

    pub fn transaction(msg: impl Into<String>) -> Self {
        DataError::Transaction(msg.into())
    }

    pub fn driver(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        DataError::Driver(err.into())
    }

    pub fn unsupported(entity: &'static str, operation: &'static str) -> Self {
        DataError::Unsupported { entity, operation }
    }

    /// Error code for logs and callers that branch on the category
    pub fn code(&self) -> &'static str {
        match self {
            DataError::Configuration(_) => "CONFIGURATION_ERROR",
            DataError::Argument(_) => "ARGUMENT_ERROR",
            DataError::Disposed(_) => "OBJECT_DISPOSED",
            DataError::Unsupported { .. } => "NOT_IMPLEMENTED",
            DataError::Conversion { .. } => "CONVERSION_ERROR",
            DataError::Connection(_) => "CONNECTION_ERROR",
            DataError::Transaction(_) => "TRANSACTION_ERROR",
            DataError::Driver(_) => "DRIVER_ERROR",
            #[cfg(feature = "sea-orm")]
            DataError::Database(_) => "DATABASE_ERROR",
        }
    }
}
