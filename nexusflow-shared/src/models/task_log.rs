/// Append-only task audit log
///
/// One row per change: creation, edits, assignment, workflow steps,
/// comments and attachments. Rows are never updated or deleted except by
/// the cascade when the task itself is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use super::task::TaskStatus;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskLog {
    pub id: i64,
    pub task_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,

    /// `created`, `updated`, `assigned`, `started`, `submitted`, `approved`,
    /// `rejected`, `commented`, `attachment_added`, `attachment_removed`
    pub action: String,

    pub from_status: Option<TaskStatus>,
    pub to_status: Option<TaskStatus>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Input for [`TaskLog::record`]
#[derive(Debug, Clone)]
pub struct NewTaskLog {
    pub task_id: Uuid,
    pub actor_id: Uuid,
    pub action: &'static str,
    pub from_status: Option<TaskStatus>,
    pub to_status: Option<TaskStatus>,
    pub details: JsonValue,
}

impl NewTaskLog {
    /// A log entry with no status change and empty details
    pub fn new(task_id: Uuid, actor_id: Uuid, action: &'static str) -> Self {
        Self {
            task_id,
            actor_id,
            action,
            from_status: None,
            to_status: None,
            details: JsonValue::Object(Default::default()),
        }
    }

    pub fn status_change(mut self, from: TaskStatus, to: TaskStatus) -> Self {
        self.from_status = Some(from);
        self.to_status = Some(to);
        self
    }

    pub fn details(mut self, details: JsonValue) -> Self {
        self.details = details;
        self
    }
}

impl TaskLog {
    pub async fn record(pool: &PgPool, entry: NewTaskLog) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO task_logs (task_id, actor_id, action, from_status, to_status, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(entry.task_id)
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(entry.from_status)
        .bind(entry.to_status)
        .bind(entry.details)
        .fetch_one(pool)
        .await
    }

    /// Full history of a task, oldest first
    pub async fn list_by_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskLog>(
            r#"
            SELECT l.id, l.task_id, l.actor_id, u.name AS actor_name, l.action,
                   l.from_status, l.to_status, l.details, l.created_at
            FROM task_logs l
            LEFT JOIN users u ON u.id = l.actor_id
            WHERE l.task_id = $1
            ORDER BY l.id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_task_log_builder() {
        let entry = NewTaskLog::new(Uuid::new_v4(), Uuid::new_v4(), "rejected")
            .status_change(TaskStatus::UnderReview, TaskStatus::Rejected)
            .details(json!({"reason": "missing totals"}));

        assert_eq!(entry.from_status, Some(TaskStatus::UnderReview));
        assert_eq!(entry.to_status, Some(TaskStatus::Rejected));
        assert_eq!(entry.details["reason"], "missing totals");
    }

    #[test]
    fn test_new_task_log_defaults_to_empty_details() {
        let entry = NewTaskLog::new(Uuid::new_v4(), Uuid::new_v4(), "commented");
        assert!(entry.details.as_object().map(|o| o.is_empty()).unwrap_or(false));
        assert!(entry.from_status.is_none());
    }
}
