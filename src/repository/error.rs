//! Repository Errors

use crate::domain::DomainError;

/// Errors that can occur in a ledger store
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A ledger rule rejected the operation inside the atomic step
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data violates an invariant
    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),
}
