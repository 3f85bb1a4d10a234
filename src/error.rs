// for error definitions
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimiterError {
    /// Errors related to the quota store
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Configuration-related errors, raised at construction time
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Quota store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Redis connection errors
    #[error("Redis connection error: {0}")]
    RedisConnection(String),

    // Redis authentication errors
    #[error("Redis authentication error: {0}")]
    RedisAuth(String),

    /// Redis command errors
    #[error("Redis command error: {0}")]
    RedisCommand(String),

    /// Reply could not be decoded into an admission decision
    #[error("Data serialization error: {0}")]
    Serialization(String),

    /// The store did not answer within the configured timeout
    #[error("Operation '{operation}' timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => StorageError::RedisAuth(err.to_string()),
            redis::ErrorKind::IoError | redis::ErrorKind::ClientError => {
                // Connection-related errors
                StorageError::RedisConnection(err.to_string())
            }
            redis::ErrorKind::TypeError => StorageError::Serialization(err.to_string()),
            _ => StorageError::RedisCommand(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for RateLimiterError {
    fn from(err: redis::RedisError) -> Self {
        RateLimiterError::Storage(err.into())
    }
}

impl From<StorageError> for RateLimiterError {
    fn from(err: StorageError) -> Self {
        RateLimiterError::Storage(err)
    }
}

// config files are JSON
impl From<serde_json::Error> for RateLimiterError {
    fn from(err: serde_json::Error) -> Self {
        RateLimiterError::Config(err.to_string())
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, RateLimiterError>;
