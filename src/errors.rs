use sea_orm::error::DbErr;
use sea_orm::SqlErr;
use serde::Serialize;

use crate::common::DocumentKind;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("{kind} with ID {id} not found")]
    NotFound { kind: DocumentKind, id: i64 },

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Cannot delete {kind} {id}: {count} related {dependent} record(s) exist")]
    RelatedRecordsExist {
        kind: DocumentKind,
        id: i64,
        dependent: DocumentKind,
        count: u64,
    },

    #[error("Transaction {stage} failed: {source}")]
    TransactionFailed {
        stage: &'static str,
        #[source]
        #[serde(skip)]
        source: DbErr,
    },

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    #[error("Database error while {context}: {source}")]
    DatabaseError {
        context: String,
        #[source]
        #[serde(skip)]
        source: DbErr,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid {kind} status transition from {from} to {to}")]
    InvalidTransition {
        kind: DocumentKind,
        from: String,
        to: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        ServiceError::db_error("executing query", err)
    }
}

impl ServiceError {
    /// Wraps a store error with the operation it interrupted. Unique-constraint
    /// violations become `Conflict` so callers can branch on them.
    pub fn db_error(context: impl Into<String>, source: DbErr) -> Self {
        let context = context.into();
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = source.sql_err() {
            return ServiceError::Conflict(format!("{}: {}", context, detail));
        }
        ServiceError::DatabaseError { context, source }
    }

    pub fn not_found(kind: DocumentKind, id: i64) -> Self {
        ServiceError::NotFound { kind, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }

    /// True for both explicit cancellation and deadline expiry.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ServiceError::Cancelled | ServiceError::Timeout)
    }
}

/// Attaches operation context to raw store results.
pub trait DbResultExt<T> {
    fn db_context(self, context: &str) -> Result<T, ServiceError>;
}

impl<T> DbResultExt<T> for Result<T, DbErr> {
    fn db_context(self, context: &str) -> Result<T, ServiceError> {
        self.map_err(|e| ServiceError::db_error(context, e))
    }
}
