// src/algorithms/local.rs

use std::sync::Mutex;

use crate::algorithms::TokenBucket;
use crate::config::Policy;

/// In-process token bucket used while the quota store cannot be trusted.
///
/// It enforces the same policy as the shared bucket but knows nothing about
/// other processes, so a fleet in fallback mode may admit more than `rate` in
/// aggregate.
#[derive(Debug)]
pub struct LocalLimiter {
    policy: Policy,
    bucket: Mutex<Option<TokenBucket>>,
}

impl LocalLimiter {
    /// Creates a limiter whose bucket starts full on first use
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            bucket: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Shorthand for `allow_n(now_ms, 1)`
    pub fn allow(&self, now_ms: u64) -> bool {
        self.allow_n(now_ms, 1)
    }

    /// Admits `n` units if the local bucket currently holds at least `n` tokens
    pub fn allow_n(&self, now_ms: u64, n: u64) -> bool {
        if n == 0 {
            return true;
        }

        // The critical section is pure arithmetic; a poisoned lock still holds a valid bucket
        let mut guard = self
            .bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let bucket = guard.get_or_insert_with(|| TokenBucket::full(&self.policy, now_ms));

        bucket.try_take(&self.policy, now_ms, n)
    }

    /// Tokens the local bucket would hold at `now_ms`
    pub fn tokens(&self, now_ms: u64) -> f64 {
        let guard = self
            .bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(bucket) => bucket.available(&self.policy, now_ms),
            None => f64::from(self.policy.burst),
        }
    }
}
