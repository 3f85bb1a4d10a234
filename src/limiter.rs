// src/limiter.rs

use std::sync::Arc;
use std::time::SystemTime;
use tracing::warn;

use crate::admission_event;
use crate::algorithms::{unix_millis, LocalLimiter};
use crate::config::Policy;
use crate::error::Result;
use crate::resilience::HealthMonitor;
use crate::storage::{QuotaOutcome, QuotaRequest, QuotaStore};

/// Rate limiter for one key whose bucket lives in a shared quota store.
///
/// Every process that builds a limiter for the same key and store draws from
/// the same bucket. While the store is marked down the limiter answers from
/// an in-process bucket with the same policy instead; it never reports an
/// error to its caller.
#[derive(Debug)]
pub struct TokenLimiter<S: QuotaStore> {
    key: String,
    policy: Policy,
    /// Store keys for this bucket; `now_ms` and `requested` are filled per call
    template: QuotaRequest,
    store: Arc<S>,
    monitor: Arc<HealthMonitor<S>>,
    fallback: LocalLimiter,
}

impl<S: QuotaStore> TokenLimiter<S> {
    /// Creates a limiter bound to `store`, failing on a policy that can never admit
    pub fn new(
        policy: Policy,
        key: impl Into<String>,
        key_prefix: &str,
        store: Arc<S>,
        monitor: Arc<HealthMonitor<S>>,
    ) -> Result<Self> {
        policy.validate()?;
        let key = key.into();

        Ok(Self {
            template: QuotaRequest::new(key_prefix, &key, policy, 0, 0),
            key,
            policy,
            store,
            monitor,
            fallback: LocalLimiter::new(policy),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Whether decisions currently go to the shared store
    pub fn is_store_alive(&self) -> bool {
        self.monitor.flag().is_alive()
    }

    /// Shorthand for `allow_n(SystemTime::now(), 1)`
    pub async fn allow(&self) -> bool {
        self.allow_n(SystemTime::now(), 1).await
    }

    /// Decides whether `n` units may proceed at `now`.
    ///
    /// A denial from the store is final. A store that times out, fails or
    /// answers with something other than a decision is reported to the health
    /// monitor and this call is answered by the local bucket.
    pub async fn allow_n(&self, now: SystemTime, n: u64) -> bool {
        if n == 0 {
            return true;
        }

        let now_ms = unix_millis(now);

        if !self.monitor.flag().is_alive() {
            let allowed = self.fallback.allow_n(now_ms, n);
            admission_event!(self.key.as_str(), allowed, n, "local");
            return allowed;
        }

        let request = QuotaRequest {
            now_ms,
            requested: n,
            ..self.template.clone()
        };

        match self.store.take(&request).await {
            QuotaOutcome::Admitted => {
                admission_event!(self.key.as_str(), true, n, "shared");
                true
            }
            QuotaOutcome::Denied => {
                admission_event!(self.key.as_str(), false, n, "shared");
                false
            }
            QuotaOutcome::StoreError(err) => {
                warn!(
                    key = self.key.as_str(),
                    error = %err,
                    "Quota store call failed, using in-process limiter"
                );
                self.monitor.start();

                let allowed = self.fallback.allow_n(now_ms, n);
                admission_event!(self.key.as_str(), allowed, n, "local");
                allowed
            }
        }
    }
}
