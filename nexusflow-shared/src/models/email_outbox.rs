/// Outbound email queue
///
/// The API never talks to a mail provider directly. It enqueues rows here
/// (inside the same transaction as the change that triggered the email) and
/// the worker claims and delivers them.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE email_status AS ENUM ('pending', 'sending', 'sent', 'failed');
///
/// CREATE TABLE email_outbox (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     to_address TEXT NOT NULL,
///     subject TEXT NOT NULL,
///     body_text TEXT NOT NULL,
///     status email_status NOT NULL DEFAULT 'pending',
///     attempts INTEGER NOT NULL DEFAULT 0,
///     last_error TEXT,
///     next_attempt_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     sent_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "email_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    /// Waiting for `next_attempt_at`
    Pending,
    /// Claimed by a worker
    Sending,
    Sent,
    /// Gave up after the maximum number of attempts
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxEmail {
    pub id: Uuid,
    pub to_address: String,
    pub subject: String,
    pub body_text: String,
    pub status: EmailStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A message ready to enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmail {
    pub to_address: String,
    pub subject: String,
    pub body_text: String,
}

pub const OUTBOX_COLUMNS: &str = "id, to_address, subject, body_text, status, attempts, \
     last_error, next_attempt_at, created_at, updated_at, sent_at";

impl OutboxEmail {
    /// Queues an email for immediate delivery
    pub async fn enqueue<'e, E>(executor: E, email: NewEmail) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO email_outbox (to_address, subject, body_text) VALUES ($1, $2, $3) \
             RETURNING {}",
            OUTBOX_COLUMNS
        );

        sqlx::query_as::<_, OutboxEmail>(&query)
            .bind(email.to_address)
            .bind(email.subject)
            .bind(email.body_text)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM email_outbox WHERE id = $1", OUTBOX_COLUMNS);

        sqlx::query_as::<_, OutboxEmail>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Emails queued for an address, newest first. Used by tests and support tooling.
    pub async fn list_for_address(
        pool: &PgPool,
        to_address: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM email_outbox WHERE lower(to_address) = lower($1) \
             ORDER BY created_at DESC",
            OUTBOX_COLUMNS
        );

        sqlx::query_as::<_, OutboxEmail>(&query)
            .bind(to_address)
            .fetch_all(pool)
            .await
    }
}

/// Delay before retry number `attempts` (1-based): 30s doubling, capped at one hour
pub fn retry_delay(attempts: i32) -> chrono::Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    let secs = 30_i64.saturating_mul(1_i64 << exponent);

    chrono::Duration::seconds(secs.min(3600))
}

impl OutboxEmail {
    /// Claims up to `limit` due emails for delivery.
    ///
    /// Rows move from `pending` to `sending` and their attempt counter is
    /// bumped in the same statement. `FOR UPDATE SKIP LOCKED` lets several
    /// workers poll concurrently without claiming the same row.
    pub async fn claim_batch(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE email_outbox SET status = 'sending', attempts = attempts + 1
            WHERE id IN (
                SELECT id FROM email_outbox
                WHERE status = 'pending' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            OUTBOX_COLUMNS
        );

        sqlx::query_as::<_, OutboxEmail>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn mark_sent(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_outbox SET status = 'sent', sent_at = NOW(), last_error = NULL \
             WHERE id = $1 AND status = 'sending'",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records a failed delivery. The email goes back to `pending` after the
    /// backoff, or to `failed` once `max_attempts` have been used.
    ///
    /// Returns the new status, or `None` if the row was not being sent.
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<Option<EmailStatus>, sqlx::Error> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "SELECT attempts FROM email_outbox WHERE id = $1 AND status = 'sending'",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some(attempts) = attempts else {
            return Ok(None);
        };

        let status = if attempts >= max_attempts {
            EmailStatus::Failed
        } else {
            EmailStatus::Pending
        };
        let next_attempt_at = Utc::now() + retry_delay(attempts);

        sqlx::query(
            "UPDATE email_outbox SET status = $2, last_error = $3, next_attempt_at = $4 \
             WHERE id = $1 AND status = 'sending'",
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .bind(next_attempt_at)
        .execute(pool)
        .await?;

        Ok(Some(status))
    }

    /// Returns rows stuck in `sending` for longer than `stale_after` to the
    /// queue (the worker that claimed them died)
    pub async fn requeue_stale(
        pool: &PgPool,
        stale_after: chrono::Duration,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_outbox SET status = 'pending', next_attempt_at = NOW() \
             WHERE status = 'sending' AND updated_at < $1",
        )
        .bind(Utc::now() - stale_after)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_status_serde() {
        assert_eq!(serde_json::to_string(&EmailStatus::Sending).unwrap(), "\"sending\"");
        let status: EmailStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, EmailStatus::Failed);
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay(1).num_seconds(), 30);
        assert_eq!(retry_delay(2).num_seconds(), 60);
        assert_eq!(retry_delay(4).num_seconds(), 240);
        assert_eq!(retry_delay(8).num_seconds(), 3600);
        assert_eq!(retry_delay(1000).num_seconds(), 3600);
        assert_eq!(retry_delay(0).num_seconds(), 30);
    }
}
