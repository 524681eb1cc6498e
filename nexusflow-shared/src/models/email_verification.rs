/// Pending email verification codes
///
/// One row per email address awaiting verification. Only the HMAC of the
/// code is stored (see [`crate::auth::otp`]); issuing a new code replaces the
/// previous row and resets the attempt counter.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE email_verifications (
///     email CITEXT PRIMARY KEY,
///     code_hash CHAR(64) NOT NULL,
///     expires_at TIMESTAMPTZ NOT NULL,
///     attempts INTEGER NOT NULL DEFAULT 0,
///     last_sent_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailVerification {
    pub email: String,

    /// Hex HMAC-SHA256 of the code
    #[serde(skip_serializing)]
    pub code_hash: String,

    pub expires_at: DateTime<Utc>,

    /// Failed verification attempts against the current code
    pub attempts: i32,

    /// When the current code was issued; drives the resend cooldown
    pub last_sent_at: DateTime<Utc>,
}

impl EmailVerification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Inserts or replaces the pending code for `email`
    pub async fn upsert<'e, E>(
        executor: E,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, EmailVerification>(
            r#"
            INSERT INTO email_verifications (email, code_hash, expires_at, attempts, last_sent_at)
            VALUES ($1, $2, $3, 0, NOW())
            ON CONFLICT (email) DO UPDATE
                SET code_hash = EXCLUDED.code_hash,
                    expires_at = EXCLUDED.expires_at,
                    attempts = 0,
                    last_sent_at = NOW()
            RETURNING email::TEXT AS email, code_hash, expires_at, attempts, last_sent_at
            "#,
        )
        .bind(email)
        .bind(code_hash)
        .bind(expires_at)
        .fetch_one(executor)
        .await
    }

    pub async fn find<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, EmailVerification>(
            r#"
            SELECT email::TEXT AS email, code_hash, expires_at, attempts, last_sent_at
            FROM email_verifications
            WHERE email = $1::CITEXT
            "#,
        )
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    /// Takes one of the `max_attempts` guesses allowed against a live code.
    ///
    /// The counter is bumped in the same statement that checks it, so
    /// concurrent guesses can never exceed the limit. Returns the row with
    /// the updated count, or `None` when the code is missing, expired or out
    /// of attempts.
    pub async fn claim_attempt<'e, E>(
        executor: E,
        email: &str,
        max_attempts: i32,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, EmailVerification>(
            r#"
            UPDATE email_verifications
            SET attempts = attempts + 1
            WHERE email = $1::CITEXT
              AND attempts < $2
              AND expires_at > NOW()
            RETURNING email::TEXT AS email, code_hash, expires_at, attempts, last_sent_at
            "#,
        )
        .bind(email)
        .bind(max_attempts)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, email: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM email_verifications WHERE email = $1::CITEXT")
            .bind(email)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes every expired code; run periodically by the worker
    pub async fn delete_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM email_verifications WHERE expires_at < NOW()")
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let row = EmailVerification {
            email: "a@b.test".to_string(),
            code_hash: "0".repeat(64),
            expires_at: now + Duration::minutes(10),
            attempts: 0,
            last_sent_at: now,
        };

        assert!(!row.is_expired(now));
        assert!(row.is_expired(now + Duration::minutes(10)));
    }
}
