/// Task attachment metadata
///
/// File bytes live in the API's attachment store under `storage_key`; this
/// table only records what was uploaded, by whom and how large it is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskAttachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,

    /// Path inside the attachment store; never sent to clients
    #[serde(skip_serializing)]
    pub storage_key: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTaskAttachment {
    /// Pre-generated so the storage key can be derived before the insert
    pub id: Uuid,
    pub task_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
}

const ATTACHMENT_COLUMNS: &str =
    "id, task_id, uploaded_by, file_name, content_type, size_bytes, storage_key, created_at";

impl TaskAttachment {
    pub async fn create(pool: &PgPool, data: CreateTaskAttachment) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO task_attachments (id, task_id, uploaded_by, file_name, content_type, \
             size_bytes, storage_key) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            ATTACHMENT_COLUMNS
        );

        sqlx::query_as::<_, TaskAttachment>(&query)
            .bind(data.id)
            .bind(data.task_id)
            .bind(data.uploaded_by)
            .bind(data.file_name)
            .bind(data.content_type)
            .bind(data.size_bytes)
            .bind(data.storage_key)
            .fetch_one(pool)
            .await
    }

    pub async fn find(
        pool: &PgPool,
        task_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM task_attachments WHERE task_id = $1 AND id = $2",
            ATTACHMENT_COLUMNS
        );

        sqlx::query_as::<_, TaskAttachment>(&query)
            .bind(task_id)
            .bind(attachment_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM task_attachments WHERE task_id = $1 ORDER BY created_at ASC",
            ATTACHMENT_COLUMNS
        );

        sqlx::query_as::<_, TaskAttachment>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    /// Storage keys of every attachment on a task, for cleanup before the
    /// task row (and with it the metadata) is deleted
    pub async fn storage_keys_for_task(
        pool: &PgPool,
        task_id: Uuid,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT storage_key FROM task_attachments WHERE task_id = $1")
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, task_id: Uuid, attachment_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_attachments WHERE task_id = $1 AND id = $2")
            .bind(task_id)
            .bind(attachment_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
