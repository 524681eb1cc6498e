/// API server configuration
///
/// Loaded once at startup from the environment (plus `.env` in development).
///
/// # Environment Variables
///
/// | Variable                   | Default          |                                  |
/// |----------------------------|------------------|----------------------------------|
/// | `DATABASE_URL`             | required         |                                  |
/// | `JWT_SECRET`               | required         | at least 32 characters           |
/// | `API_HOST` / `API_PORT`    | `0.0.0.0` / 8080 |                                  |
/// | `DATABASE_MAX_CONNECTIONS` | 10               |                                  |
/// | `CORS_ORIGINS`             | `*`              | comma separated                  |
/// | `PRODUCTION`               | false            | enables HSTS                     |
/// | `REDIS_URL`                | unset            | shared rate-limit buckets        |
/// | `OTP_SECRET`               | `JWT_SECRET`     | HMAC key for stored codes        |
/// | `OTP_TTL_SECS`             | 600              |                                  |
/// | `OTP_RESEND_COOLDOWN_SECS` | 60               |                                  |
/// | `OTP_MAX_ATTEMPTS`         | 5                |                                  |
/// | `UPLOAD_DIR`               | `./uploads`      | attachment storage root          |
/// | `MAX_UPLOAD_BYTES`         | 10485760         |                                  |
/// | `RATE_LIMIT_AUTH_PER_MIN`  | 10               | per email on register/login/OTP  |
/// | `RATE_LIMIT_API_PER_MIN`   | 300              | per user on authenticated routes |
///
/// # Example
///
/// ```no_run
/// use nexusflow_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("listening on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::{bail, Context};
use nexusflow_shared::auth::otp::OtpPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub uploads: UploadConfig,
    pub rate_limit: RateLimitConfig,

    /// Shared rate limiting when set; in-process buckets otherwise
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed origins; `["*"]` allows any
    pub cors_origins: Vec<String>,

    pub production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing key. Generate with `openssl rand -hex 32`.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    pub secret: String,
    pub ttl_secs: i64,
    pub resend_cooldown_secs: i64,
    pub max_attempts: i32,
}

impl OtpConfig {
    pub fn policy(&self) -> OtpPolicy {
        OtpPolicy {
            ttl: chrono::Duration::seconds(self.ttl_secs),
            resend_cooldown: chrono::Duration::seconds(self.resend_cooldown_secs),
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub auth_per_minute: u32,
    pub api_per_minute: u32,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        _ => Ok(default),
    }
}

fn parse_bool(raw: Option<String>) -> bool {
    matches!(
        raw.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

impl Config {
    /// Loads configuration from process environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET environment variable is required")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 characters long");
        }

        let otp_secret = lookup("OTP_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| jwt_secret.clone());

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let otp = OtpConfig {
            secret: otp_secret,
            ttl_secs: parse_or(&lookup, "OTP_TTL_SECS", 600)?,
            resend_cooldown_secs: parse_or(&lookup, "OTP_RESEND_COOLDOWN_SECS", 60)?,
            max_attempts: parse_or(&lookup, "OTP_MAX_ATTEMPTS", 5)?,
        };
        if otp.ttl_secs <= 0 || otp.max_attempts <= 0 || otp.resend_cooldown_secs < 0 {
            bail!("OTP settings must be positive");
        }

        let rate_limit = RateLimitConfig {
            auth_per_minute: parse_or(&lookup, "RATE_LIMIT_AUTH_PER_MIN", 10)?,
            api_per_minute: parse_or(&lookup, "RATE_LIMIT_API_PER_MIN", 300)?,
        };
        if rate_limit.auth_per_minute == 0 || rate_limit.api_per_minute == 0 {
            bail!("RATE_LIMIT_AUTH_PER_MIN and RATE_LIMIT_API_PER_MIN must be positive");
        }

        let config = Self {
            api: ApiConfig {
                host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "API_PORT", 8080)?,
                cors_origins,
                production: parse_bool(lookup("PRODUCTION")),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            otp,
            uploads: UploadConfig {
                dir: PathBuf::from(lookup("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string())),
                max_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            },
            rate_limit,
            redis_url: lookup("REDIS_URL").filter(|s| !s.trim().is_empty()),
        };

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgresql://localhost/nf"), ("JWT_SECRET", SECRET)]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(config.allows_any_origin());
        assert!(!config.api.production);
        assert_eq!(config.otp.secret, SECRET);
        assert_eq!(config.otp.policy(), OtpPolicy::default());
        assert_eq!(config.uploads.max_bytes, 10 * 1024 * 1024);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/nf"),
            ("JWT_SECRET", SECRET),
            ("API_PORT", "9000"),
            ("CORS_ORIGINS", "https://app.nexusflow.test, https://admin.nexusflow.test"),
            ("PRODUCTION", "true"),
            ("OTP_SECRET", "otp-only"),
            ("OTP_MAX_ATTEMPTS", "3"),
            ("REDIS_URL", "redis://cache:6379"),
        ])
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.cors_origins.len(), 2);
        assert!(!config.allows_any_origin());
        assert!(config.api.production);
        assert_eq!(config.otp.secret, "otp-only");
        assert_eq!(config.otp.max_attempts, 3);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
    }

    #[test]
    fn test_required_and_invalid_values() {
        assert!(load(&[("JWT_SECRET", SECRET)]).is_err());
        assert!(load(&[("DATABASE_URL", "postgresql://x"), ("JWT_SECRET", "short")]).is_err());

        let err = load(&[
            ("DATABASE_URL", "postgresql://x"),
            ("JWT_SECRET", SECRET),
            ("API_PORT", "not-a-port"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
    }

    #[test]
    fn test_rate_limits_must_be_positive() {
        for key in ["RATE_LIMIT_AUTH_PER_MIN", "RATE_LIMIT_API_PER_MIN"] {
            let err = load(&[("DATABASE_URL", "postgresql://x"), ("JWT_SECRET", SECRET), (key, "0")]).unwrap_err();
            assert!(err.to_string().contains("must be positive"), "{}", key);
        }

        let config = load(&[
            ("DATABASE_URL", "postgresql://x"),
            ("JWT_SECRET", SECRET),
            ("RATE_LIMIT_AUTH_PER_MIN", "1"),
        ])
        .unwrap();
        assert_eq!(config.rate_limit.auth_per_minute, 1);
    }
}
