// src/registry.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::config::{LimiterConfig, MonitorConfig, Policy};
use crate::error::Result;
use crate::limiter::TokenLimiter;
use crate::resilience::{HealthFlag, HealthMonitor};
use crate::storage::{QuotaStore, RedisQuotaStore};

const DEFAULT_KEY_PREFIX: &str = "ratelimit";

/// Process-wide map from logical key to its [`TokenLimiter`].
///
/// The registry owns the store handle, the shared [`HealthFlag`] and the
/// [`HealthMonitor`]; every limiter it creates shares all three. Entries live
/// until removed explicitly or the registry is dropped.
#[derive(Debug)]
pub struct TokenLimiterRegistry<S: QuotaStore> {
    store: Arc<S>,
    monitor: Arc<HealthMonitor<S>>,
    key_prefix: String,
    limiters: Mutex<HashMap<String, Arc<TokenLimiter<S>>>>,
}

impl TokenLimiterRegistry<RedisQuotaStore> {
    /// Connects to Redis and builds a registry from `config`
    pub async fn connect(config: &LimiterConfig) -> Result<Self> {
        config.validate()?;
        let store = RedisQuotaStore::new(config.redis.clone()).await?;
        Ok(Self::from_config(Arc::new(store), config))
    }
}

impl<S: QuotaStore> TokenLimiterRegistry<S> {
    pub fn new(store: Arc<S>, monitor_config: MonitorConfig) -> Self {
        Self::with_prefix(store, monitor_config, DEFAULT_KEY_PREFIX)
    }

    pub fn from_config(store: Arc<S>, config: &LimiterConfig) -> Self {
        Self::with_prefix(store, config.monitor.clone(), &config.key_prefix)
    }

    pub fn with_prefix(store: Arc<S>, monitor_config: MonitorConfig, key_prefix: &str) -> Self {
        let monitor = HealthMonitor::new(Arc::clone(&store), HealthFlag::new(), monitor_config);
        Self {
            store,
            monitor: Arc::new(monitor),
            key_prefix: key_prefix.to_string(),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the limiter for `key`, creating it on first use.
    ///
    /// Lookup and insert happen under one lock, so concurrent first calls for
    /// a key all get the same instance. An existing limiter keeps the policy it
    /// was created with.
    pub fn get_or_create(&self, rate: u32, burst: u32, key: &str) -> Result<Arc<TokenLimiter<S>>> {
        let mut limiters = self.lock_limiters();

        if let Some(limiter) = limiters.get(key) {
            let requested = Policy { rate, burst };
            if *limiter.policy() != requested {
                debug!(
                    key,
                    existing = ?limiter.policy(),
                    requested = ?requested,
                    "Limiter already exists with a different policy, keeping the existing one"
                );
            }
            return Ok(Arc::clone(limiter));
        }

        let policy = Policy::new(rate, burst)?;
        let limiter = Arc::new(TokenLimiter::new(
            policy,
            key,
            &self.key_prefix,
            Arc::clone(&self.store),
            Arc::clone(&self.monitor),
        )?);
        limiters.insert(key.to_string(), Arc::clone(&limiter));
        debug!(key, rate, burst, "Created token limiter");

        Ok(limiter)
    }

    /// Plain lookup
    pub fn get(&self, key: &str) -> Option<Arc<TokenLimiter<S>>> {
        self.lock_limiters().get(key).cloned()
    }

    /// Forgets the limiter for `key`; holders of the returned handle may keep using it
    pub fn remove(&self, key: &str) -> Option<Arc<TokenLimiter<S>>> {
        self.lock_limiters().remove(key)
    }

    pub fn len(&self) -> usize {
        self.lock_limiters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock_limiters().keys().cloned().collect()
    }

    /// Handle to the shared store liveness flag
    pub fn health_flag(&self) -> HealthFlag {
        self.monitor.flag().clone()
    }

    pub fn is_store_alive(&self) -> bool {
        self.monitor.flag().is_alive()
    }

    /// Marks the store down and starts probing it; no-op while a probe task runs
    pub fn start_monitor(&self) {
        self.monitor.start();
    }

    pub fn is_monitor_running(&self) -> bool {
        self.monitor.is_running()
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor<S>> {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Stops a running probe task. Limiters keep answering, locally if the store is down.
    pub fn shutdown(&self) {
        self.monitor.shutdown();
    }

    fn lock_limiters(&self) -> MutexGuard<'_, HashMap<String, Arc<TokenLimiter<S>>>> {
        // inserts are single calls, a poisoned map is still consistent
        self.limiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S: QuotaStore> Drop for TokenLimiterRegistry<S> {
    fn drop(&mut self) {
        self.monitor.shutdown();
    }
}
