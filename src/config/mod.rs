// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{RateLimiterError, Result};

/// Token bucket policy bound to one limiter key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Tokens refilled per second
    pub rate: u32,

    /// Bucket capacity, also the largest instantaneous allowance
    pub burst: u32,
}

impl Policy {
    pub fn new(rate: u32, burst: u32) -> Result<Self> {
        let policy = Self { rate, burst };
        policy.validate()?;
        Ok(policy)
    }

    /// Rejects policies that could never admit anything
    pub fn validate(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(RateLimiterError::Config(
                "rate must be a positive number of tokens per second".to_string(),
            ));
        }
        if self.burst == 0 {
            return Err(RateLimiterError::Config(
                "burst must be a positive number of tokens".to_string(),
            ));
        }
        if self.burst < self.rate {
            tracing::debug!(
                rate = self.rate,
                burst = self.burst,
                "burst below rate caps sustained throughput below rate"
            );
        }
        Ok(())
    }

    /// Lifetime of idle bucket state in the store: twice the time to refill from empty
    pub fn state_ttl(&self) -> Duration {
        let secs = (2 * u64::from(self.burst)).div_ceil(u64::from(self.rate.max(1)));
        Duration::from_secs(secs.max(1))
    }
}

/// Configuration for the Redis quota store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Timeout for establishing the connection
    #[serde(default = "default_conn_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Timeout for a single quota script round trip
    #[serde(default = "default_command_timeout", with = "duration_serde")]
    pub command_timeout: Duration,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_command_timeout() -> Duration {
    Duration::from_millis(500)
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connection_timeout: default_conn_timeout(),
            command_timeout: default_command_timeout(),
        }
    }
}

/// Configuration for the store health monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between liveness probes while the store is considered down
    #[serde(default = "default_probe_interval", with = "duration_serde")]
    pub probe_interval: Duration,

    /// Timeout for a single probe
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,
}

fn default_probe_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(1)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: default_probe_interval(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

/// Process-wide limiter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Key prefix to use for all keys in storage
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_key_prefix() -> String {
    "ratelimit".to_string()
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            redis: RedisConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl LimiterConfig {
    /// Builds a config from defaults overridden by `TOKEN_LIMITER_*` variables (and a `.env` file)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(url) = std::env::var("TOKEN_LIMITER_REDIS_URL") {
            config.redis.url = url;
        }
        if let Ok(prefix) = std::env::var("TOKEN_LIMITER_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(timeout) = env_millis("TOKEN_LIMITER_COMMAND_TIMEOUT_MS")? {
            config.redis.command_timeout = timeout;
        }
        if let Some(interval) = env_millis("TOKEN_LIMITER_PROBE_INTERVAL_MS")? {
            config.monitor.probe_interval = interval;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON document; absent fields take their defaults
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RateLimiterError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.probe_interval.is_zero() {
            return Err(RateLimiterError::Config(
                "probe_interval must be greater than zero".to_string(),
            ));
        }
        if self.redis.command_timeout.is_zero() {
            return Err(RateLimiterError::Config(
                "command_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| RateLimiterError::Config(format!("{} is not a number: {}", name, e))),
        Err(_) => Ok(None),
    }
}

// Helper module to serialize/deserialize Duration with serde
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
