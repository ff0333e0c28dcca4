//! Error types for the shutdown log service.

use uuid::Uuid;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Authentication errors raised by the auth provider.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("An account already exists for {0}")]
    EmailTaken(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Configured session lifetime does not yield a valid expiry time")]
    SessionTtlOutOfRange,

    #[error("Store failure: {0}")]
    Store(#[from] DatabaseError),
}

/// Failure kinds of the daily-log contract.
///
/// `NotAuthenticated` and `NotFound` are expected outcomes a caller can act on;
/// `Store` means the store could not be reached or rejected the operation.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Daily log {id} not found")]
    NotFound { id: Uuid },

    #[error("Daily log {id} was modified concurrently (expected revision {expected}, found {actual})")]
    Conflict { id: Uuid, expected: i64, actual: i64 },

    #[error("Store failure: {0}")]
    Store(#[from] DatabaseError),
}
