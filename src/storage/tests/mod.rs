// src/storage/tests/mod.rs


// Contract checks that should hold for any quota store
pub(crate) mod common {
    use crate::config::Policy;
    use crate::storage::{QuotaOutcome, QuotaRequest, QuotaStore};

    fn request(key: &str, policy: Policy, now_ms: u64, requested: u64) -> QuotaRequest {
        QuotaRequest::new("contract", key, policy, now_ms, requested)
    }

    // A fresh bucket admits exactly `burst` tokens, then denies
    pub async fn test_burst_then_deny<S: QuotaStore>(store: &S, key: &str, now_ms: u64) {
        let policy = Policy::new(10, 10).unwrap();

        for i in 0..10 {
            assert_eq!(
                store.take(&request(key, policy, now_ms, 1)).await,
                QuotaOutcome::Admitted,
                "Request {} should be admitted",
                i
            );
        }
        assert_eq!(
            store.take(&request(key, policy, now_ms, 1)).await,
            QuotaOutcome::Denied,
            "11th request should be denied"
        );

        // 500ms at 10/s refills 5 tokens
        let later = now_ms + 500;
        let mut admitted = 0;
        for _ in 0..10 {
            if store.take(&request(key, policy, later, 1)).await == QuotaOutcome::Admitted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5, "Exactly 5 requests fit after 500ms");
    }

    // A denied multi-token request leaves the tokens for smaller ones
    pub async fn test_denied_batch_keeps_tokens<S: QuotaStore>(store: &S, key: &str, now_ms: u64) {
        let policy = Policy::new(1, 5).unwrap();

        assert_eq!(
            store.take(&request(key, policy, now_ms, 4)).await,
            QuotaOutcome::Admitted
        );
        assert_eq!(
            store.take(&request(key, policy, now_ms, 2)).await,
            QuotaOutcome::Denied
        );
        assert_eq!(
            store.take(&request(key, policy, now_ms, 1)).await,
            QuotaOutcome::Admitted
        );
    }

    // Buckets for different keys are independent
    pub async fn test_keys_are_isolated<S: QuotaStore>(store: &S, prefix: &str, now_ms: u64) {
        let policy = Policy::new(1, 1).unwrap();
        let first = format!("{}_a", prefix);
        let second = format!("{}_b", prefix);

        assert_eq!(
            store.take(&request(&first, policy, now_ms, 1)).await,
            QuotaOutcome::Admitted
        );
        assert_eq!(
            store.take(&request(&first, policy, now_ms, 1)).await,
            QuotaOutcome::Denied
        );
        assert_eq!(
            store.take(&request(&second, policy, now_ms, 1)).await,
            QuotaOutcome::Admitted,
            "Different key should be admitted"
        );
    }
}

#[cfg(test)]
mod request_tests {
    use crate::config::Policy;
    use crate::storage::QuotaRequest;

    #[test]
    fn test_bucket_keys_share_a_hash_tag() {
        let request = QuotaRequest::new("ratelimit", "/api/users", Policy::new(1, 1).unwrap(), 0, 1);
        assert_eq!(request.tokens_key, "{ratelimit:/api/users}.tokens");
        assert_eq!(request.timestamp_key, "{ratelimit:/api/users}.ts");
    }

    #[test]
    fn test_empty_prefix_uses_bare_key() {
        let request = QuotaRequest::new("", "login", Policy::new(1, 1).unwrap(), 0, 1);
        assert_eq!(request.tokens_key, "{login}.tokens");
        assert_eq!(request.timestamp_key, "{login}.ts");
    }
}
