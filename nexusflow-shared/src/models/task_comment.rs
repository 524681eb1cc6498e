/// Task comments
///
/// Flat discussion thread under a task. Comments are returned with the
/// author's display name so the client doesn't need a second lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Option<Uuid>,

    /// Author's name at read time; `None` if the author was deleted
    pub author_name: Option<String>,

    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl TaskComment {
    pub async fn create(
        pool: &PgPool,
        task_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TaskComment>(
            r#"
            WITH inserted AS (
                INSERT INTO task_comments (task_id, author_id, body)
                VALUES ($1, $2, $3)
                RETURNING id, task_id, author_id, body, created_at
            )
            SELECT i.id, i.task_id, i.author_id, u.name AS author_name, i.body, i.created_at
            FROM inserted i
            LEFT JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(task_id)
        .bind(author_id)
        .bind(body)
        .fetch_one(pool)
        .await
    }

    /// Comments on a task, oldest first
    pub async fn list_by_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskComment>(
            r#"
            SELECT c.id, c.task_id, c.author_id, u.name AS author_name, c.body, c.created_at
            FROM task_comments c
            LEFT JOIN users u ON u.id = c.author_id
            WHERE c.task_id = $1
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        task_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskComment>(
            r#"
            SELECT c.id, c.task_id, c.author_id, u.name AS author_name, c.body, c.created_at
            FROM task_comments c
            LEFT JOIN users u ON u.id = c.author_id
            WHERE c.task_id = $1 AND c.id = $2
            "#,
        )
        .bind(task_id)
        .bind(comment_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, task_id: Uuid, comment_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_comments WHERE task_id = $1 AND id = $2")
            .bind(task_id)
            .bind(comment_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
