/// One-time passcodes for email verification
///
/// Registration emails a six-digit code that must be confirmed before the
/// account can log in. Codes are never stored in clear: the
/// `email_verifications` row holds `HMAC-SHA256(OTP_SECRET, email ":" code)`,
/// and verification compares MACs in constant time.
///
/// Rules enforced here:
///
/// - a code expires `ttl` after it is issued
/// - a new code cannot be issued within `resend_cooldown` of the last one
/// - after `max_attempts` wrong guesses the code is burned and a new one
///   must be requested
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::auth::otp::{issue, verify, OtpPolicy};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let policy = OtpPolicy::default();
/// let mut conn = pool.acquire().await?;
///
/// let issued = issue(&mut conn, "otp-secret", "jane@acme.test", &policy).await?;
/// // ... email issued.code to the user ...
///
/// verify(&pool, "otp-secret", "jane@acme.test", &issued.code, &policy).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use sqlx::{PgConnection, PgPool};

use crate::models::email_verification::EmailVerification;

type HmacSha256 = Hmac<Sha256>;

/// Number of digits in a code
pub const CODE_LENGTH: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("No verification code is pending for this email")]
    NotFound,

    #[error("Verification code has expired")]
    Expired,

    #[error("Too many incorrect attempts; request a new code")]
    TooManyAttempts,

    #[error("Incorrect verification code ({remaining} attempts left)")]
    Invalid { remaining: i32 },

    #[error("A code was sent recently; retry in {retry_after_secs} seconds")]
    Cooldown { retry_after_secs: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Expiry, cooldown and attempt limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    pub ttl: Duration,
    pub resend_cooldown: Duration,
    pub max_attempts: i32,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(10),
            resend_cooldown: Duration::seconds(60),
            max_attempts: 5,
        }
    }
}

/// A freshly issued code. `code` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Random zero-padded six-digit code
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", n, width = CODE_LENGTH)
}

fn mac_for(secret: &str, email: &str, code: &str) -> HmacSha256 {
    // new_from_slice only fails for fixed-size keys; HMAC takes any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(email.trim().to_lowercase().as_bytes());
    mac.update(b":");
    mac.update(code.as_bytes());
    mac
}

/// Hex HMAC of `email:code`; email is normalised to lowercase
pub fn hash_code(secret: &str, email: &str, code: &str) -> String {
    hex::encode(mac_for(secret, email, code).finalize().into_bytes())
}

/// Constant-time comparison of `code` against a stored hash
pub fn verify_code(secret: &str, email: &str, code: &str, stored_hash: &str) -> bool {
    let Ok(expected) = hex::decode(stored_hash.trim()) else {
        return false;
    };
    mac_for(secret, email, code.trim()).verify_slice(&expected).is_ok()
}

/// Seconds left before another code may be sent, or `None` if allowed now
pub fn cooldown_remaining(
    last_sent_at: DateTime<Utc>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Option<u64> {
    let remaining = (last_sent_at + cooldown - now).num_seconds();
    (remaining > 0).then_some(remaining as u64)
}

/// Generates and stores a new code for `email`, replacing any pending one.
///
/// Takes a connection rather than the pool so registration can issue the
/// code inside its transaction.
///
/// # Errors
///
/// `OtpError::Cooldown` when the previous code is younger than the cooldown.
pub async fn issue(
    conn: &mut PgConnection,
    secret: &str,
    email: &str,
    policy: &OtpPolicy,
) -> Result<IssuedOtp, OtpError> {
    let now = Utc::now();

    if let Some(existing) = EmailVerification::find(&mut *conn, email).await? {
        if let Some(retry_after_secs) =
            cooldown_remaining(existing.last_sent_at, now, policy.resend_cooldown)
        {
            return Err(OtpError::Cooldown { retry_after_secs });
        }
    }

    let code = generate_code();
    let expires_at = now + policy.ttl;
    EmailVerification::upsert(&mut *conn, email, &hash_code(secret, email, &code), expires_at)
        .await?;

    tracing::debug!(expires_at = %expires_at, "Issued verification code");
    Ok(IssuedOtp { code, expires_at })
}

/// Checks `code` for `email`. The pending row is removed on success and
/// whenever the code can no longer be used.
pub async fn verify(
    pool: &PgPool,
    secret: &str,
    email: &str,
    code: &str,
    policy: &OtpPolicy,
) -> Result<(), OtpError> {
    let Some(pending) = EmailVerification::claim_attempt(pool, email, policy.max_attempts).await? else {
        // no guess was granted; work out why
        let row = EmailVerification::find(pool, email)
            .await?
            .ok_or(OtpError::NotFound)?;

        EmailVerification::delete(pool, email).await?;
        return Err(if row.is_expired(Utc::now()) {
            OtpError::Expired
        } else {
            OtpError::TooManyAttempts
        });
    };

    if verify_code(secret, email, code, &pending.code_hash) {
        EmailVerification::delete(pool, email).await?;
        return Ok(());
    }

    if pending.attempts >= policy.max_attempts {
        EmailVerification::delete(pool, email).await?;
        return Err(OtpError::TooManyAttempts);
    }

    Err(OtpError::Invalid {
        remaining: policy.max_attempts - pending.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_format() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_is_stable_and_email_case_insensitive() {
        let a = hash_code("secret", "Jane@Acme.test", "123456");
        let b = hash_code("secret", "jane@acme.test", "123456");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_depends_on_secret_email_and_code() {
        let base = hash_code("secret", "jane@acme.test", "123456");
        assert_ne!(base, hash_code("other", "jane@acme.test", "123456"));
        assert_ne!(base, hash_code("secret", "john@acme.test", "123456"));
        assert_ne!(base, hash_code("secret", "jane@acme.test", "123457"));
    }

    #[test]
    fn test_verify_code() {
        let stored = hash_code("secret", "jane@acme.test", "042042");

        assert!(verify_code("secret", "jane@acme.test", "042042", &stored));
        assert!(verify_code("secret", "JANE@acme.test", " 042042 ", &stored));
        assert!(!verify_code("secret", "jane@acme.test", "042043", &stored));
        assert!(!verify_code("secret", "jane@acme.test", "042042", "not-hex"));
    }

    #[test]
    fn test_cooldown_remaining() {
        let sent = Utc::now();
        let cooldown = Duration::seconds(60);

        assert_eq!(cooldown_remaining(sent, sent + Duration::seconds(15), cooldown), Some(45));
        assert_eq!(cooldown_remaining(sent, sent + Duration::seconds(60), cooldown), None);
        assert_eq!(cooldown_remaining(sent, sent + Duration::hours(1), cooldown), None);
    }

    #[test]
    fn test_default_policy() {
        let policy = OtpPolicy::default();
        assert_eq!(policy.ttl, Duration::minutes(10));
        assert_eq!(policy.resend_cooldown, Duration::seconds(60));
        assert_eq!(policy.max_attempts, 5);
    }
}
