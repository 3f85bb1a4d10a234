// src/algorithms/mod.rs

pub mod local;
pub mod token_bucket;

#[cfg(test)]
mod tests;

pub use local::LocalLimiter;
pub use token_bucket::TokenBucket;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch for `time`, zero for times before it
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Helper function to get current time in milliseconds
pub fn current_time_millis() -> u64 {
    unix_millis(SystemTime::now())
}
