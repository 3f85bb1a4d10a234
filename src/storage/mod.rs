// src/storage/mod.rs

pub mod memory;
pub mod redis;

#[cfg(test)]
mod tests;

pub use self::memory::MemoryQuotaStore;
pub use self::redis::RedisQuotaStore;

use super::error::{Result, StorageError};
use crate::config::Policy;
use async_trait::async_trait;
use std::fmt::Debug;

/// One atomic read-refill-decide-write against a shared bucket
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaRequest {
    /// Store key holding the token count
    pub tokens_key: String,

    /// Store key holding the last update time
    pub timestamp_key: String,

    /// Policy of the bucket
    pub policy: Policy,

    /// Caller's clock, milliseconds since the Unix epoch
    pub now_ms: u64,

    /// Tokens to take
    pub requested: u64,
}

impl QuotaRequest {
    /// Builds a request whose two state keys share one Redis Cluster hash slot
    pub fn new(prefix: &str, key: &str, policy: Policy, now_ms: u64, requested: u64) -> Self {
        let tag = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", prefix, key)
        };
        Self {
            tokens_key: format!("{{{}}}.tokens", tag),
            timestamp_key: format!("{{{}}}.ts", tag),
            policy,
            now_ms,
            requested,
        }
    }
}

/// Decoded result of a quota script
///
/// `Denied` is the bucket working as intended. Only `StoreError` means the
/// store could not be trusted for this call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaOutcome {
    Admitted,
    Denied,
    StoreError(StorageError),
}

impl QuotaOutcome {
    pub fn is_store_error(&self) -> bool {
        matches!(self, QuotaOutcome::StoreError(_))
    }
}

impl From<StorageError> for QuotaOutcome {
    fn from(err: StorageError) -> Self {
        QuotaOutcome::StoreError(err)
    }
}

/// Core trait that all quota stores must implement
///
/// A store owns no policy: it executes the bucket script for whatever request
/// it is handed, indivisibly with respect to any concurrent call on the same
/// keys from any process.
#[async_trait]
pub trait QuotaStore: Send + Sync + Debug + 'static {
    // Runs the token bucket script for one request
    async fn take(&self, request: &QuotaRequest) -> QuotaOutcome;

    // Lightweight liveness probe
    async fn ping(&self) -> Result<()>;
}
