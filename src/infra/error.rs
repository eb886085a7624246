//! Error taxonomy shared by both services.

use thiserror::Error;

/// Errors surfaced by stores, services, and the bus adapter.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Persistence failure. Transaction rollback happens at the store
    /// layer; the error is re-raised, never swallowed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing entity.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input or illegal state transition.
    #[error("validation error: {0}")]
    Validation(String),

    /// Duplicate resource or double-terminal transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing or invalid credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Role mismatch.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Event bus failure (publish, connect, stream setup).
    #[error("event bus error: {0}")]
    Bus(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Whether a sqlx error is a Postgres unique-constraint violation
/// (SQLSTATE 23505). Stores use this to map duplicate inserts onto
/// [`ServiceError::Conflict`] for a unified error surface.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}
