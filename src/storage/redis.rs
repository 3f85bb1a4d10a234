// src/storage/redis.rs

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, Script, Value};
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::RedisConfig;
use crate::error::{RateLimiterError, Result, StorageError};
use crate::storage::{QuotaOutcome, QuotaRequest, QuotaStore};
use crate::store_op;

/// Token bucket script.
///
/// KEYS[1] tokens, KEYS[2] last update (ms).
/// ARGV: rate (tokens/s), burst, now (ms), requested, ttl (s).
/// Returns Lua `true` (integer 1) when admitted, `false` (nil) when denied.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local last_tokens = tonumber(redis.call("GET", KEYS[1]))
if last_tokens == nil then
    last_tokens = burst
end
last_tokens = math.max(0, math.min(burst, last_tokens))

local last_refreshed = tonumber(redis.call("GET", KEYS[2]))
if last_refreshed == nil then
    last_refreshed = 0
end

local elapsed = math.max(0, now - last_refreshed)
local filled = math.min(burst, last_tokens + elapsed * rate / 1000)
local allowed = filled >= requested
local new_tokens = filled
if allowed then
    new_tokens = filled - requested
end

redis.call("SETEX", KEYS[1], ttl, new_tokens)
redis.call("SETEX", KEYS[2], ttl, math.max(now, last_refreshed))

return allowed
"#;

/// Quota store backed by a Redis server
#[derive(Clone)]
pub struct RedisQuotaStore {
    // multiplexed; cloning shares the underlying connection
    connection: ConnectionManager,
    script: Script,
    config: RedisConfig,
}

// Manually implement Debug, the connection manager has nothing useful to print
impl fmt::Debug for RedisQuotaStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQuotaStore")
            .field("url", &self.config.url)
            .field("command_timeout", &self.config.command_timeout)
            .finish()
    }
}

impl RedisQuotaStore {
    /// Creates a new Redis quota store with the given configuration
    pub async fn new(config: RedisConfig) -> Result<Self> {
        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str())
            .map_err(|e| RateLimiterError::Storage(StorageError::RedisConnection(e.to_string())))?;

        let connection_future = ConnectionManager::new(client);

        let connection =
            match tokio::time::timeout(config.connection_timeout, connection_future).await {
                Ok(result) => result.map_err(|e| {
                    RateLimiterError::Storage(StorageError::RedisConnection(e.to_string()))
                })?,
                Err(_) => {
                    return Err(RateLimiterError::Storage(StorageError::RedisConnection(
                        format!(
                            "Connection to Redis at {} timed out after {:?}",
                            config.url, config.connection_timeout
                        ),
                    )));
                }
            };

        Ok(Self {
            connection,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
            config,
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Runs the script and returns the raw reply, bounded by the command timeout
    async fn invoke(&self, request: &QuotaRequest) -> std::result::Result<Value, StorageError> {
        let mut conn = self.connection.clone();
        let ttl = request.policy.state_ttl().as_secs();

        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(&request.tokens_key)
            .key(&request.timestamp_key)
            .arg(request.policy.rate)
            .arg(request.policy.burst)
            .arg(request.now_ms)
            .arg(request.requested)
            .arg(ttl);

        let timeout = self.config.command_timeout;
        match tokio::time::timeout(timeout, invocation.invoke_async::<Value>(&mut conn)).await {
            Ok(reply) => reply.map_err(StorageError::from),
            Err(_) => Err(StorageError::Timeout {
                operation: "token_bucket_script",
                elapsed: timeout,
            }),
        }
    }
}

/// Maps a script reply onto an admission decision
pub(crate) fn decode_reply(value: Value) -> QuotaOutcome {
    match value {
        // Lua true arrives as integer 1
        Value::Int(1) => QuotaOutcome::Admitted,
        Value::Int(_) => QuotaOutcome::Denied,
        // Lua false arrives as a nil bulk reply
        Value::Nil => QuotaOutcome::Denied,
        Value::Boolean(true) => QuotaOutcome::Admitted,
        Value::Boolean(false) => QuotaOutcome::Denied,
        other => QuotaOutcome::StoreError(StorageError::Serialization(format!(
            "unexpected reply from token bucket script: {:?}",
            other
        ))),
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn take(&self, request: &QuotaRequest) -> QuotaOutcome {
        let started = Instant::now();
        let outcome = match self.invoke(request).await {
            Ok(value) => decode_reply(value),
            Err(err) => err.into(),
        };

        store_op!(
            "take",
            request.tokens_key.as_str(),
            !outcome.is_store_error(),
            started.elapsed().as_millis() as u64
        );
        outcome
    }

    /// Ping Redis to check health with timeout
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let timeout: Duration = self.config.command_timeout;

        let ping_cmd = redis::cmd("PING");
        let ping_future = ping_cmd.query_async::<String>(&mut conn);

        let result = match tokio::time::timeout(timeout, ping_future).await {
            Ok(inner_result) => inner_result.map_err(RateLimiterError::from)?,
            Err(_) => {
                return Err(RateLimiterError::Storage(StorageError::Timeout {
                    operation: "ping",
                    elapsed: timeout,
                }));
            }
        };

        if result == "PONG" {
            Ok(())
        } else {
            Err(RateLimiterError::Storage(StorageError::RedisCommand(
                format!("Unexpected response from Redis PING: {}", result),
            )))
        }
    }
}
