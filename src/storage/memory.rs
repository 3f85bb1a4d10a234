// src/storage/memory.rs

// In-memory quota store (for tests, demos and single-process deployments).
// Each bucket lives under its tokens key behind its own mutex, which gives the
// same per-key atomicity the Redis script gets from the server. The map lock is
// held for writing only to insert a new key or to purge.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::algorithms::TokenBucket;
use crate::error::Result;
use crate::storage::{QuotaOutcome, QuotaRequest, QuotaStore};

/// Entry in the in-memory store
#[derive(Debug, Clone, Copy, Default)]
struct BucketEntry {
    // None until the first request sets a policy-shaped bucket
    bucket: Option<TokenBucket>,
    expires_at_ms: u64,
}

impl BucketEntry {
    fn live_tokens(&self, now_ms: u64) -> Option<f64> {
        self.bucket
            .filter(|_| self.expires_at_ms > now_ms)
            .map(|bucket| bucket.tokens())
    }

    // Runs the bucket script against this entry
    fn take(&mut self, request: &QuotaRequest) -> bool {
        let policy = &request.policy;
        let now_ms = request.now_ms;

        // A missing or expired bucket is a full one
        let mut bucket = match self.bucket {
            Some(stored) if self.expires_at_ms > now_ms => {
                TokenBucket::from_state(policy, stored.tokens(), stored.last_update_ms())
            }
            _ => TokenBucket::from_state(policy, f64::from(policy.burst), 0),
        };

        let admitted = bucket.try_take(policy, now_ms, request.requested);
        self.bucket = Some(bucket);
        self.expires_at_ms = now_ms.saturating_add(policy.state_ttl().as_millis() as u64);
        admitted
    }
}

/// In-memory quota store implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryQuotaStore {
    data: Arc<RwLock<HashMap<String, Mutex<BucketEntry>>>>,
}

fn lock_entry(entry: &Mutex<BucketEntry>) -> MutexGuard<'_, BucketEntry> {
    entry.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens stored for `tokens_key` as of its last update, if the entry is live at `now_ms`
    pub fn stored_tokens(&self, tokens_key: &str, now_ms: u64) -> Option<f64> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        let tokens = data
            .get(tokens_key)
            .and_then(|entry| lock_entry(entry).live_tokens(now_ms));
        tokens
    }

    /// Number of buckets held, expired ones included until purged
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops buckets whose TTL ran out before `now_ms`
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        let before = data.len();
        data.retain(|_, entry| lock_entry(entry).expires_at_ms > now_ms);
        before - data.len()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn take(&self, request: &QuotaRequest) -> QuotaOutcome {
        let admitted = {
            let data = self.data.read().unwrap_or_else(|e| e.into_inner());
            let admitted = data
                .get(&request.tokens_key)
                .map(|entry| lock_entry(entry).take(request));
            admitted
        };

        // First request for this key: insert under the write lock. Another
        // caller may have inserted it meanwhile, `entry` keeps theirs.
        let admitted = match admitted {
            Some(admitted) => admitted,
            None => {
                let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
                let entry = data.entry(request.tokens_key.clone()).or_default();
                let admitted = lock_entry(entry).take(request);
                admitted
            }
        };

        if admitted {
            QuotaOutcome::Admitted
        } else {
            QuotaOutcome::Denied
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
