/// Request rate limiting
///
/// Token buckets keyed by `{scope}:{subject}`:
///
/// - `auth:{email}` on register, login and OTP endpoints
/// - `api:{user_id}` on every authenticated route, via [`api_rate_limit`]
///
/// With `REDIS_URL` set the buckets live in Redis and are shared by every
/// API instance. Otherwise, or while Redis is unreachable, each process
/// keeps its own buckets in memory.
///
/// Allowed responses carry `X-RateLimit-Remaining`; rejected ones are 429
/// with `Retry-After`.

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Extension, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use nexusflow_shared::auth::middleware::AuthContext;
use nexusflow_shared::redis::{BucketConfig, RateDecision, RedisRateLimiter, TokenBucket};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Local buckets idle this long are dropped when the map is pruned
const IDLE_BUCKET_SECS: f64 = 600.0;

/// Prune once the map holds this many buckets
const PRUNE_THRESHOLD: usize = 10_000;

pub struct RateLimiter {
    redis: Option<RedisRateLimiter>,
    local: Mutex<HashMap<String, TokenBucket>>,
    epoch: Instant,
}

impl RateLimiter {
    pub fn local() -> Self {
        Self {
            redis: None,
            local: Mutex::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    pub fn with_redis(redis: RedisRateLimiter) -> Self {
        Self {
            redis: Some(redis),
            ..Self::local()
        }
    }

    pub fn is_shared(&self) -> bool {
        self.redis.is_some()
    }

    /// Takes one token from the `scope:subject` bucket
    pub async fn decide(&self, scope: &str, subject: &str, config: BucketConfig) -> RateDecision {
        let key = format!("{}:{}", scope, subject.to_lowercase());

        if let Some(redis) = &self.redis {
            match redis.check(&key, &config).await {
                Ok(decision) => return decision,
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "Redis rate limit check failed; using local bucket");
                }
            }
        }

        self.decide_local(key, config, self.epoch.elapsed().as_secs_f64())
    }

    fn decide_local(&self, key: String, config: BucketConfig, now: f64) -> RateDecision {
        let mut buckets = match self.local.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if buckets.len() >= PRUNE_THRESHOLD {
            buckets.retain(|_, bucket| now - bucket.updated_at < IDLE_BUCKET_SECS);
        }

        buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::full(&config, now))
            .try_take(&config, now)
    }

    /// Like [`decide`](Self::decide) but turns a rejection into a 429
    pub async fn check(&self, scope: &str, subject: &str, config: BucketConfig) -> ApiResult<u32> {
        match self.decide(scope, subject, config).await {
            RateDecision::Allowed { remaining } => Ok(remaining),
            RateDecision::Limited { retry_after_secs } => {
                tracing::info!(scope, retry_after_secs, "Rate limit exceeded");
                Err(ApiError::RateLimitExceeded {
                    retry_after: retry_after_secs,
                    message: format!("Too many requests. Retry in {} seconds", retry_after_secs),
                })
            }
        }
    }
}

/// Per-user limit on authenticated routes
///
/// Must run inside the JWT layer so the [`AuthContext`] extension is present.
pub async fn api_rate_limit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let config = BucketConfig::per(state.config.rate_limit.api_per_minute, 60);
    let remaining = state
        .limiter
        .check("api", &auth.user_id.to_string(), config)
        .await?;

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert("x-ratelimit-remaining", HeaderValue::from(remaining));

    Ok(response)
}
