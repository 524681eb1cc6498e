/// Worker orchestrator
///
/// Drains the email outbox: claims due rows, hands each one to the
/// [`Mailer`] on its own Tokio task, and records the outcome.
///
/// ```text
/// WorkerOrchestrator::run
///   ├─> OutboxQueue::claim       up to the free delivery slots
///   ├─> deliver (spawned)        Mailer::send, then complete / fail
///   └─> OutboxQueue::sweep       every sweep_interval
/// ```
///
/// # Concurrency
///
/// A semaphore bounds deliveries in flight to `max_concurrent`. Each spawned
/// delivery holds one permit until its outcome is written.
///
/// # Shutdown
///
/// Cancelling the [`CancellationToken`] stops polling. In-flight deliveries
/// are given [`SHUTDOWN_GRACE`] to finish; anything still `sending` after
/// that is picked up by a later sweep.
///
/// # Example
///
/// ```no_run
/// use nexusflow_worker::{mailer::LogMailer, orchestrator::{OrchestratorConfig, WorkerOrchestrator}};
/// use std::sync::Arc;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let orchestrator = WorkerOrchestrator::new(
///     pool,
///     Arc::new(LogMailer),
///     "no-reply@nexusflow.local",
///     OrchestratorConfig::default(),
/// );
///
/// let shutdown = orchestrator.shutdown_token();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     shutdown.cancel();
/// });
///
/// orchestrator.run().await?;
/// # Ok(())
/// # }
/// ```

use crate::mailer::Mailer;
use crate::queue::{OutboxQueue, QueueError};
use nexusflow_shared::models::email_outbox::{EmailStatus, OutboxEmail};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for in-flight deliveries
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Pause between polls when the queue is empty
    pub poll_interval: Duration,

    /// Deliveries in flight at once
    pub max_concurrent: usize,

    /// Most rows claimed per poll
    pub batch_size: usize,

    /// Attempts before an email is marked `failed`
    pub max_attempts: i32,

    pub sweep_interval: Duration,

    /// Age after which a `sending` row is assumed orphaned
    pub stale_after: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_concurrent: 4,
            batch_size: 10,
            max_attempts: 5,
            sweep_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(300),
        }
    }
}

pub struct WorkerOrchestrator {
    queue: OutboxQueue,
    mailer: Arc<dyn Mailer>,
    from: Arc<str>,
    config: OrchestratorConfig,
    slots: Arc<Semaphore>,
    shutdown_token: CancellationToken,
}

impl WorkerOrchestrator {
    pub fn new(
        db: PgPool,
        mailer: Arc<dyn Mailer>,
        from: impl Into<String>,
        config: OrchestratorConfig,
    ) -> Self {
        let queue = OutboxQueue::new(db, config.batch_size, config.max_attempts);
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

        Self {
            queue,
            mailer,
            from: Arc::from(from.into()),
            config,
            slots,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancel to stop [`run`](Self::run)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn queue(&self) -> &OutboxQueue {
        &self.queue
    }

    /// Polls until the shutdown token is cancelled
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            mailer = self.mailer.name(),
            max_concurrent = self.config.max_concurrent,
            batch_size = self.config.batch_size,
            "Worker orchestrator starting"
        );

        let mut next_sweep = Instant::now();

        // the claim is never raced against other futures: dropping it
        // mid-query could strand rows in `sending` until the next sweep
        while !self.shutdown_token.is_cancelled() {
            if Instant::now() >= next_sweep {
                if let Err(e) = self.queue.sweep(self.config.stale_after).await {
                    tracing::error!(error = %e, "Sweep failed");
                }
                next_sweep = Instant::now() + self.config.sweep_interval;
            }

            let idle = match self.poll_once().await {
                Ok(count) => count == 0,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim emails");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => break,
                    _ = sleep(self.config.poll_interval) => {}
                }
            }
        }

        tracing::info!("Shutdown requested, waiting for in-flight deliveries");
        if !self.drain(SHUTDOWN_GRACE).await {
            tracing::warn!("Deliveries still running at shutdown; a later sweep will requeue them");
        }

        tracing::info!("Worker orchestrator shut down");
        Ok(())
    }

    /// Claims as many emails as there are free slots and spawns a delivery
    /// for each. Returns how many were dispatched.
    ///
    /// Waits for a free slot first, so a saturated worker does not spin.
    pub async fn poll_once(&self) -> Result<usize, QueueError> {
        let first = match self.slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            // the semaphore is never closed
            Err(_) => return Ok(0),
        };

        let wanted = self.slots.available_permits() + 1;
        let emails = self.queue.claim(wanted).await?;
        let count = emails.len();

        let mut first = Some(first);
        for email in emails {
            let permit = match first.take() {
                Some(permit) => permit,
                None => match self.slots.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let queue = self.queue.clone();
            let mailer = self.mailer.clone();
            let from = self.from.clone();

            tokio::spawn(async move {
                deliver(&queue, mailer.as_ref(), &from, email).await;
                drop(permit);
            });
        }

        Ok(count)
    }

    /// Waits until no delivery holds a slot; `false` on timeout
    pub async fn drain(&self, grace: Duration) -> bool {
        let all = self.config.max_concurrent.max(1) as u32;
        match timeout(grace, self.slots.acquire_many(all)).await {
            Ok(Ok(_permits)) => true,
            Ok(Err(_)) | Err(_) => false,
        }
    }
}

/// Sends one email and records the outcome. Failures are logged, never
/// returned: the row's status is the record.
async fn deliver(queue: &OutboxQueue, mailer: &dyn Mailer, from: &str, email: OutboxEmail) {
    let id = email.id;

    match mailer.send(from, &email).await {
        Ok(()) => {
            if let Err(e) = queue.complete(id).await {
                tracing::error!(email_id = %id, error = %e, "Sent but could not mark as sent");
            } else {
                tracing::info!(email_id = %id, attempt = email.attempts, "Email sent");
            }
        }
        Err(send_error) => match queue.fail(id, &send_error.to_string()).await {
            Ok(EmailStatus::Failed) => {
                tracing::error!(
                    email_id = %id,
                    attempts = email.attempts,
                    error = %send_error,
                    "Giving up on email"
                );
            }
            Ok(_) => {
                tracing::warn!(
                    email_id = %id,
                    attempt = email.attempts,
                    error = %send_error,
                    "Delivery failed, will retry"
                );
            }
            Err(e) => {
                tracing::error!(email_id = %id, error = %e, "Could not record delivery failure");
            }
        },
    }
}
