/// Redis integration
///
/// Used for one thing: sharing rate-limit buckets between API instances.
/// Everything else lives in PostgreSQL.
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::redis::{BucketConfig, RedisClient, RedisConfig, RedisRateLimiter};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::new("redis://localhost:6379")).await?;
/// let limiter = RedisRateLimiter::new(client);
///
/// let decision = limiter.check("login:jane@acme.test", &BucketConfig::per(5, 60)).await?;
/// println!("allowed: {}", decision.is_allowed());
/// # Ok(())
/// # }
/// ```

pub mod client;
pub mod rate_limit;

pub use client::{RedisClient, RedisClientError, RedisConfig};
pub use rate_limit::{BucketConfig, RateDecision, RedisRateLimiter, TokenBucket};
