/// Outbox queue
///
/// Thin layer over the `email_outbox` table: claim due rows, record the
/// outcome of each delivery, and sweep up after crashed workers.
///
/// Claiming uses `FOR UPDATE SKIP LOCKED`, so any number of workers can
/// poll the same table.
///
/// # Example
///
/// ```no_run
/// use nexusflow_worker::queue::OutboxQueue;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let queue = OutboxQueue::new(pool, 10, 5);
///
/// for email in queue.claim(10).await? {
///     println!("sending {} to {}", email.id, email.to_address);
///     queue.complete(email.id).await?;
/// }
/// # Ok(())
/// # }
/// ```

use nexusflow_shared::models::{
    email_outbox::{EmailStatus, OutboxEmail},
    email_verification::EmailVerification,
};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The row was no longer in `sending` (requeued by a sweep, or handled
    /// by another worker)
    #[error("Email {0} is not being sent")]
    NotClaimed(Uuid),
}

/// What one sweep cleaned up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_codes: u64,
    pub requeued_emails: u64,
}

#[derive(Debug, Clone)]
pub struct OutboxQueue {
    db: PgPool,
    batch_size: usize,
    max_attempts: i32,
}

impl OutboxQueue {
    pub fn new(db: PgPool, batch_size: usize, max_attempts: i32) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
            max_attempts,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Claims up to `limit` due emails (capped at the batch size)
    pub async fn claim(&self, limit: usize) -> Result<Vec<OutboxEmail>, QueueError> {
        let limit = limit.min(self.batch_size);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let emails = OutboxEmail::claim_batch(&self.db, limit as i64).await?;
        if !emails.is_empty() {
            tracing::debug!(count = emails.len(), "Claimed emails");
        }

        Ok(emails)
    }

    pub async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        if OutboxEmail::mark_sent(&self.db, id).await? {
            Ok(())
        } else {
            Err(QueueError::NotClaimed(id))
        }
    }

    /// Records a failed attempt; returns `Failed` once attempts run out
    pub async fn fail(&self, id: Uuid, error: &str) -> Result<EmailStatus, QueueError> {
        OutboxEmail::mark_failed(&self.db, id, error, self.max_attempts)
            .await?
            .ok_or(QueueError::NotClaimed(id))
    }

    /// Deletes expired verification codes and requeues emails that have
    /// sat in `sending` longer than `stale_after`
    pub async fn sweep(&self, stale_after: Duration) -> Result<SweepReport, QueueError> {
        let stale_after = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::minutes(5));

        let report = SweepReport {
            expired_codes: EmailVerification::delete_expired(&self.db).await?,
            requeued_emails: OutboxEmail::requeue_stale(&self.db, stale_after).await?,
        };

        if report != SweepReport::default() {
            tracing::info!(
                expired_codes = report.expired_codes,
                requeued_emails = report.requeued_emails,
                "Sweep cleaned up"
            );
        }

        Ok(report)
    }
}
