// src/test_utils.rs

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{MonitorConfig, Policy};
use crate::error::{RateLimiterError, Result, StorageError};
use crate::registry::TokenLimiterRegistry;
use crate::storage::redis::decode_reply;
use crate::storage::{MemoryQuotaStore, QuotaOutcome, QuotaRequest, QuotaStore};

/// Quota store that behaves like the in-memory store but can be told to fail
#[derive(Debug, Default)]
pub struct MockQuotaStore {
    inner: MemoryQuotaStore,
    /// Every take fails with a connection error while set
    down: AtomicBool,
    /// Every take gets an undecodable reply while set
    garbled: AtomicBool,
    /// Failures handed out to the next takes, in order
    scripted: Mutex<VecDeque<StorageError>>,
    /// Pings fail while set
    ping_fails: AtomicBool,
    /// Pings sleep this long before answering
    ping_delay: Mutex<Option<Duration>>,
    takes: AtomicUsize,
    pings: AtomicUsize,
}

impl MockQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: takes and pings fail until `recover`
    pub fn go_down(&self) {
        self.down.store(true, Ordering::SeqCst);
        self.ping_fails.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.down.store(false, Ordering::SeqCst);
        self.ping_fails.store(false, Ordering::SeqCst);
    }

    pub fn set_garbled(&self, garbled: bool) {
        self.garbled.store(garbled, Ordering::SeqCst);
    }

    pub fn set_ping_failure(&self, fails: bool) {
        self.ping_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_ping_delay(&self, delay: Option<Duration>) {
        *self.ping_delay.lock().unwrap() = delay;
    }

    /// The next take fails with `err`, later ones behave normally
    pub fn fail_next(&self, err: StorageError) {
        self.scripted.lock().unwrap().push_back(err);
    }

    pub fn take_count(&self) -> usize {
        self.takes.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn memory(&self) -> &MemoryQuotaStore {
        &self.inner
    }
}

#[async_trait]
impl QuotaStore for MockQuotaStore {
    async fn take(&self, request: &QuotaRequest) -> QuotaOutcome {
        self.takes.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.scripted.lock().unwrap().pop_front() {
            return QuotaOutcome::StoreError(err);
        }
        if self.down.load(Ordering::SeqCst) {
            return QuotaOutcome::StoreError(StorageError::RedisConnection(
                "Simulated failure".to_string(),
            ));
        }
        if self.garbled.load(Ordering::SeqCst) {
            return decode_reply(redis::Value::SimpleString("OK".to_string()));
        }

        self.inner.take(request).await
    }

    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);

        let delay = *self.ping_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(RateLimiterError::Storage(StorageError::RedisConnection(
                "Simulated ping failure".to_string(),
            )));
        }
        Ok(())
    }
}

/// Monitor settings fast enough for tests
pub fn fast_monitor_config() -> MonitorConfig {
    MonitorConfig {
        probe_interval: Duration::from_millis(10),
        probe_timeout: Duration::from_millis(50),
    }
}

/// Registry over a fresh mock store
pub fn mock_registry() -> (Arc<MockQuotaStore>, TokenLimiterRegistry<MockQuotaStore>) {
    let store = Arc::new(MockQuotaStore::new());
    let registry = TokenLimiterRegistry::new(Arc::clone(&store), fast_monitor_config());
    (store, registry)
}

pub fn policy(rate: u32, burst: u32) -> Policy {
    Policy::new(rate, burst).unwrap()
}

pub fn timeout_error() -> StorageError {
    StorageError::Timeout {
        operation: "token_bucket_script",
        elapsed: Duration::from_millis(500),
    }
}
