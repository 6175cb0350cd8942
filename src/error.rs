//! Session error types

use thiserror::Error;

/// Errors that can occur during session operations
///
/// None of these ever reach the HTTP client: the lifecycle manager logs them and
/// degrades to a local session instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backing store could not be reached or refused the operation
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    /// A new session record could not be established
    #[error("Could not create session: {0}")]
    CreateFailure(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid session ID format
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    /// Session payload is not a JSON object, or a store setting is malformed
    #[error("Invalid session data: {0}")]
    InvalidData(String),

    /// Redis error (when redis-store feature is enabled)
    #[cfg(feature = "redis-store")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Database error (when postgres-store feature is enabled)
    #[cfg(feature = "postgres-store")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for session store operations
pub type SessionResult<T> = Result<T, SessionError>;
