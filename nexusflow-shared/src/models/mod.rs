/// Database models
///
/// Each model owns its SQL: rows are plain structs deriving
/// `sqlx::FromRow`, and operations are associated async functions taking a
/// pool (or any `PgExecutor` when the call has to join a transaction).
///
/// - `organization`, `role`, `user`: tenants, permission sets and accounts
/// - `email_verification`: pending registration OTPs
/// - `email_outbox`: outbound mail, delivered by the worker
/// - `task`, `task_comment`, `task_attachment`, `task_log`: the task board
/// - `chat`: rooms, participants and messages
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::models::task::{Task, TaskFilter};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, org_id: Uuid) -> Result<(), sqlx::Error> {
/// let open = Task::list(&pool, org_id, &TaskFilter::default(), 20, 0).await?;
/// println!("{} tasks", open.len());
/// # Ok(())
/// # }
/// ```

pub mod chat;
pub mod email_outbox;
pub mod email_verification;
pub mod organization;
pub mod role;
pub mod task;
pub mod task_attachment;
pub mod task_comment;
pub mod task_log;
pub mod user;
