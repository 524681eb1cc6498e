/// Token-bucket rate limiting
///
/// A bucket holds up to `capacity` tokens and refills continuously at
/// `refill_per_sec`. Each request takes one token; an empty bucket rejects
/// the request and reports how long until a token is available.
///
/// Two stores implement the same arithmetic:
///
/// - [`TokenBucket::try_take`]: pure function used by the in-process limiter
/// - [`RedisRateLimiter`]: the same algorithm as an atomic Lua script, so
///   every API instance shares one bucket per key

use redis::Script;

use super::client::{RedisClient, RedisClientError};

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl BucketConfig {
    /// `requests` allowed per `per_secs`, all available as a burst
    pub fn per(requests: u32, per_secs: u64) -> Self {
        Self {
            capacity: requests as f64,
            refill_per_sec: requests as f64 / per_secs.max(1) as f64,
        }
    }

    /// Seconds until a bucket left empty holds a token again
    fn wait_for_token(&self, tokens: f64) -> u64 {
        if self.refill_per_sec <= 0.0 {
            return u64::MAX;
        }
        ((1.0 - tokens) / self.refill_per_sec).ceil().max(1.0) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Bucket state as kept by the in-process limiter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    pub tokens: f64,

    /// Seconds, on any monotonic clock
    pub updated_at: f64,
}

impl TokenBucket {
    pub fn full(config: &BucketConfig, now: f64) -> Self {
        Self {
            tokens: config.capacity,
            updated_at: now,
        }
    }

    /// Refills for the time elapsed since the last call, then tries to take
    /// one token.
    pub fn try_take(&mut self, config: &BucketConfig, now: f64) -> RateDecision {
        let elapsed = (now - self.updated_at).max(0.0);
        self.tokens = (self.tokens + elapsed * config.refill_per_sec).min(config.capacity);
        self.updated_at = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateDecision::Allowed {
                remaining: self.tokens.floor() as u32,
            }
        } else {
            RateDecision::Limited {
                retry_after_secs: config.wait_for_token(self.tokens),
            }
        }
    }
}

// KEYS[1] bucket hash; ARGV: capacity, refill/sec, now (secs, float)
// Returns {allowed (0|1), remaining tokens, retry after secs}
const TOKEN_BUCKET_LUA: &str = r#"
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1]) or capacity
local ts = tonumber(state[2]) or now

tokens = math.min(capacity, tokens + math.max(0, now - ts) * rate)

local allowed = 0
local retry = 0
if tokens >= 1 then
  tokens = tokens - 1
  allowed = 1
else
  retry = math.max(1, math.ceil((1 - tokens) / rate))
end

redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(now))
redis.call('EXPIRE', KEYS[1], math.ceil(capacity / rate) + 1)

return {allowed, math.floor(tokens), retry}
"#;

/// Shared-bucket limiter backed by Redis
#[derive(Clone)]
pub struct RedisRateLimiter {
    client: RedisClient,
    script: Script,
}

impl RedisRateLimiter {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            script: Script::new(TOKEN_BUCKET_LUA),
        }
    }

    /// Takes a token from the bucket named `key` (prefixed with the client's
    /// key prefix)
    pub async fn check(&self, key: &str, config: &BucketConfig) -> Result<RateDecision, RedisClientError> {
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        let mut conn = self.client.connection();
        let mut invocation = self.script.key(self.client.key(&format!("rl:{}", key)));
        invocation
            .arg(config.capacity)
            .arg(config.refill_per_sec)
            .arg(now);

        let (allowed, remaining, retry): (i64, i64, i64) = self
            .client
            .with_timeout(async move { invocation.invoke_async(&mut conn).await })
            .await?;

        Ok(if allowed == 1 {
            RateDecision::Allowed {
                remaining: remaining.max(0) as u32,
            }
        } else {
            RateDecision::Limited {
                retry_after_secs: retry.max(1) as u64,
            }
        })
    }
}
