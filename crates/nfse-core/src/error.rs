//! Error types module
//!
//! All errors in the ingestion core are unified under the `AppError` enum,
//! which can represent database, storage, validation, and domain errors.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx`
//! feature. With `default-features = false`, build without the `sqlx` feature;
//! then `AppError` has no database variant.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Postgres unique-constraint violation.
#[cfg(feature = "sqlx")]
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A persistence-layer uniqueness constraint rejected the write. The
    /// caller treats this as "document already exists", not as a failure.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        if let SqlxError::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return AppError::Duplicate(db_err.message().to_string());
            }
        }
        AppError::Database(err)
    }
}

impl AppError {
    /// Whether this error means "the record already exists".
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppError::Duplicate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_detection() {
        let err = AppError::Duplicate("invoices_tenant_codigo_key".to_string());
        assert!(err.is_duplicate());
        assert!(!AppError::NotFound("x".to_string()).is_duplicate());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::InvalidInput("empty document".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty document");
    }
}
