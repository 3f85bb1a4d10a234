// library entry
pub mod algorithms;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod registry;
pub mod resilience;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
mod tests;

// Re-export key components for convenience
pub use config::{LimiterConfig, MonitorConfig, Policy, RedisConfig};
pub use error::{RateLimiterError, Result, StorageError};
pub use limiter::TokenLimiter;
pub use logging::init as init_logging;
pub use registry::TokenLimiterRegistry;
pub use resilience::{HealthFlag, HealthMonitor};
pub use storage::{MemoryQuotaStore, QuotaOutcome, QuotaRequest, QuotaStore, RedisQuotaStore};
