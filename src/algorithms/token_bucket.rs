// src/algorithms/token_bucket.rs

use crate::config::Policy;

/// Token bucket state
///
/// The bucket holds up to `burst` tokens and is replenished continuously at
/// `rate` tokens per second. Each admitted request removes `n` tokens; a
/// request that finds fewer than `n` tokens is rejected and removes nothing.
///
/// Timestamps are Unix milliseconds. The same arithmetic runs inside the
/// Redis script, so the in-process and shared buckets agree on every decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    /// Current (fractional) token count
    tokens: f64,

    /// Time of the last update, in milliseconds since the Unix epoch
    last_update_ms: u64,
}

impl TokenBucket {
    /// A full bucket, as seen by the first request for a key
    pub fn full(policy: &Policy, now_ms: u64) -> Self {
        Self {
            tokens: f64::from(policy.burst),
            last_update_ms: now_ms,
        }
    }

    /// Restores a bucket from stored state, clamping the token count into `[0, burst]`
    pub fn from_state(policy: &Policy, tokens: f64, last_update_ms: u64) -> Self {
        let tokens = if tokens.is_finite() { tokens } else { 0.0 };
        Self {
            tokens: tokens.clamp(0.0, f64::from(policy.burst)),
            last_update_ms,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms
    }

    /// Calculate the number of tokens held at `now_ms` without changing the bucket
    pub fn available(&self, policy: &Policy, now_ms: u64) -> f64 {
        // A clock that went backwards counts as no elapsed time
        let elapsed_ms = now_ms.saturating_sub(self.last_update_ms);
        let refill = elapsed_ms as f64 * f64::from(policy.rate) / 1000.0;

        (self.tokens + refill).min(f64::from(policy.burst))
    }

    /// Refill up to `now_ms`, then take `n` tokens if they are all there.
    ///
    /// Returns whether the request was admitted. The refill is committed in
    /// both cases; a denied request never changes the token count beyond it.
    pub fn try_take(&mut self, policy: &Policy, now_ms: u64, n: u64) -> bool {
        let filled = self.available(policy, now_ms);
        self.last_update_ms = self.last_update_ms.max(now_ms);

        let requested = n as f64;
        if filled >= requested {
            self.tokens = filled - requested;
            true
        } else {
            self.tokens = filled;
            false
        }
    }
}
