/// Task endpoints
///
/// # Endpoints
///
/// - `POST   /api/tasks` - create (`tasks:create`)
/// - `GET    /api/tasks?status=&assigned_to=&limit=&offset=` - list
/// - `GET    /api/tasks/:id`
/// - `PUT    /api/tasks/:id` - edit (creator or `tasks:assign`)
/// - `DELETE /api/tasks/:id` - delete (creator or `tasks:delete`)
/// - `POST   /api/tasks/:id/{start,submit,approve,reject}` - workflow
/// - `GET|POST /api/tasks/:id/comments`, `DELETE /api/tasks/:id/comments/:comment_id`
/// - `GET|POST /api/tasks/:id/attachments`,
///   `GET|DELETE /api/tasks/:id/attachments/:attachment_id`
/// - `GET    /api/tasks/:id/logs` - audit trail
///
/// # Visibility
///
/// Without `tasks:view_all` a user only sees tasks they created or are
/// assigned; other tasks answer 404.
///
/// # Workflow
///
/// ```text
/// to_do ──start──▶ in_progress ──submit──▶ under_review ──approve──▶ completed
///                      ▲                        │
///                      └────start──── rejected ◀┘ reject
/// ```
///
/// Start and submit belong to the assignee (the creator while unassigned);
/// approve and reject need `tasks:review`. Each step is a conditional write
/// against the status the caller saw, so two people acting at once get one
/// success and one `409 Conflict`.

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
    storage::{sanitize_file_name, AttachmentStore},
};
use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use nexusflow_shared::{
    auth::{
        authorization::{load_principal, AuthzError, Principal},
        middleware::AuthContext,
    },
    events::{Channel, ServerEvent},
    mail,
    models::{
        email_outbox::OutboxEmail,
        role::Permission,
        task::{CreateTask, Task, TaskAction, TaskFilter, TaskPriority, TaskStatus, UpdateTask},
        task_attachment::{CreateTaskAttachment, TaskAttachment},
        task_comment::TaskComment,
        task_log::{NewTaskLog, TaskLog},
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{double_option, Pagination};

const MAX_DESCRIPTION_CHARS: usize = 10_000;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: TaskPriority,

    pub assigned_to: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial update; `null` clears a nullable field
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub priority: Option<TaskPriority>,

    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl UpdateTaskRequest {
    fn into_update(self) -> UpdateTask {
        UpdateTask {
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description,
            priority: self.priority,
            assigned_to: self.assigned_to,
            due_date: self.due_date,
        }
    }

    /// Names of the fields present, for the audit log
    fn changed_fields(&self) -> Vec<&'static str> {
        [
            ("title", self.title.is_some()),
            ("description", self.description.is_some()),
            ("priority", self.priority.is_some()),
            ("assigned_to", self.assigned_to.is_some()),
            ("due_date", self.due_date.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(length(max = 2000, message = "Note must be at most 2000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(min = 1, max = 2000, message = "Reason must be 1-2000 characters"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment must be 1-5000 characters"))]
    pub body: String,
}

/// Loads a task the principal is allowed to see
async fn visible_task(state: &AppState, principal: &Principal, task_id: Uuid) -> ApiResult<Task> {
    Task::find_by_id_and_org(&state.db, task_id, principal.user.organization_id)
        .await?
        .filter(|task| principal.can(Permission::TasksViewAll) || task.involves(principal.user.id))
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

/// Checks that the principal may give the task to `assignee`
async fn check_assignee(state: &AppState, principal: &Principal, assignee: Uuid) -> ApiResult<User> {
    if assignee != principal.user.id {
        principal.require(Permission::TasksAssign)?;
    }

    User::find_by_id_and_org(&state.db, assignee, principal.user.organization_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::invalid("assigned_to", "Assignee must be an active member of your organization"))
}

/// Sends `task-updated` to the creator's and assignee's personal channels
fn notify(state: &AppState, task: &Task, actor_id: Uuid) {
    let mut recipients: Vec<Uuid> = task.created_by.into_iter().chain(task.assigned_to).collect();
    recipients.dedup();

    for user_id in recipients {
        state.hub.publish(
            Channel::User(user_id),
            ServerEvent::TaskUpdated {
                task_id: task.id,
                title: task.title.clone(),
                status: task.status,
                actor_id,
            },
        );
    }
}

/// Queues the "new task" email unless people assign themselves
async fn email_assignee(state: &AppState, task: &Task, assignee: &User, actor: &User) -> ApiResult<()> {
    if assignee.id == actor.id {
        return Ok(());
    }

    let email = mail::task_assigned_email(&assignee.email, &assignee.name, &task.title, &actor.name);
    OutboxEmail::enqueue(&state.db, email).await?;
    Ok(())
}

/// Create a task
///
/// ```text
/// POST /api/tasks
/// {
///   "title": "Quarterly report",
///   "description": "Numbers for Q3",
///   "priority": "high",
///   "assigned_to": "uuid",
///   "due_date": "2025-10-01T00:00:00Z"
/// }
/// ```
///
/// Assigning the task to someone else needs `tasks:assign` and queues an
/// email to the assignee.
///
/// # Errors
///
/// - `403 Forbidden`: missing `tasks:create` (or `tasks:assign`)
/// - `422 Unprocessable Entity`: validation failed or unknown assignee
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    validate_request(&req)?;
    let principal = load_principal(&state.db, &auth).await?;
    principal.require(Permission::TasksCreate)?;

    let assignee = match req.assigned_to {
        Some(id) => Some(check_assignee(&state, &principal, id).await?),
        None => None,
    };

    let task = Task::create(
        &state.db,
        CreateTask {
            organization_id: principal.user.organization_id,
            title: req.title.trim().to_string(),
            description: req.description.filter(|d| !d.trim().is_empty()),
            priority: req.priority,
            created_by: Some(principal.user.id),
            assigned_to: assignee.as_ref().map(|u| u.id),
            due_date: req.due_date,
        },
    )
    .await?;

    TaskLog::record(
        &state.db,
        NewTaskLog::new(task.id, principal.user.id, "created").details(json!({
            "title": task.title,
            "priority": task.priority,
            "assigned_to": task.assigned_to,
        })),
    )
    .await?;

    if let Some(assignee) = &assignee {
        email_assignee(&state, &task, assignee, &principal.user).await?;
        notify(&state, &task, principal.user.id);
    }

    tracing::info!(
        task_id = %task.id,
        organization_id = %task.organization_id,
        created_by = %principal.user.id,
        "Task created"
    );

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    let principal = load_principal(&state.db, &auth).await?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve();

    let filter = TaskFilter {
        status: query.status,
        assigned_to: query.assigned_to,
        visible_to: (!principal.can(Permission::TasksViewAll)).then_some(principal.user.id),
    };

    let organization_id = principal.user.organization_id;
    let tasks = Task::list(&state.db, organization_id, &filter, limit, offset).await?;
    let total = Task::count(&state.db, organization_id, &filter).await?;

    Ok(Json(TaskListResponse {
        tasks,
        total,
        limit,
        offset,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let principal = load_principal(&state.db, &auth).await?;
    Ok(Json(visible_task(&state, &principal, task_id).await?))
}

/// Edit a task
///
/// Only the fields present in the body change; `null` clears description,
/// assignee or due date. Status is not editable here, use the workflow
/// endpoints.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    validate_request(&req)?;
    if let Some(Some(description)) = &req.description {
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(ApiError::invalid("description", "Description must be at most 10000 characters"));
        }
    }

    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;
    principal.require_owner_or(task.created_by, Permission::TasksAssign)?;

    let fields = req.changed_fields();
    if fields.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let new_assignee = match req.assigned_to {
        Some(Some(id)) if task.assigned_to != Some(id) => Some(check_assignee(&state, &principal, id).await?),
        _ => None,
    };
    let assignee_changed = matches!(req.assigned_to, Some(a) if a != task.assigned_to);

    let updated = Task::update(&state.db, task.id, task.organization_id, req.into_update())
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    TaskLog::record(
        &state.db,
        NewTaskLog::new(updated.id, principal.user.id, "updated").details(json!({ "fields": fields })),
    )
    .await?;

    if assignee_changed {
        TaskLog::record(
            &state.db,
            NewTaskLog::new(updated.id, principal.user.id, "assigned").details(json!({
                "from": task.assigned_to,
                "to": updated.assigned_to,
            })),
        )
        .await?;

        if let Some(assignee) = &new_assignee {
            email_assignee(&state, &updated, assignee, &principal.user).await?;
        }
        notify(&state, &updated, principal.user.id);
    }

    Ok(Json(updated))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;
    principal.require_owner_or(task.created_by, Permission::TasksDelete)?;

    let keys = TaskAttachment::storage_keys_for_task(&state.db, task.id).await?;
    if !Task::delete(&state.db, task.id, task.organization_id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    for key in keys {
        if let Err(e) = state.store.delete(&key).await {
            tracing::warn!(task_id = %task.id, key = %key, error = %e, "Failed to remove attachment file");
        }
    }

    tracing::info!(task_id = %task.id, deleted_by = %principal.user.id, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Runs one workflow step for the caller
async fn apply_action(
    state: &AppState,
    auth: &AuthContext,
    task_id: Uuid,
    action: TaskAction,
    note: Option<String>,
) -> ApiResult<Task> {
    let principal = load_principal(&state.db, auth).await?;
    let task = visible_task(state, &principal, task_id).await?;

    if action.is_review() {
        principal.require(Permission::TasksReview)?;
    } else if task.worker_id() != Some(principal.user.id) {
        return Err(ApiError::Forbidden(
            "Only the assignee can start or submit this task".to_string(),
        ));
    }

    let target = action.target();
    if !task.status.can_transition_to(target) {
        return Err(ApiError::Conflict(format!(
            "Cannot move a task from {} to {}",
            task.status, target
        )));
    }

    let updated = Task::transition(&state.db, &task, action, note.clone())
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("Task was changed by someone else; reload and try again".to_string())
        })?;

    let details = match &note {
        Some(note) => json!({ "note": note }),
        None => json!({}),
    };
    TaskLog::record(
        &state.db,
        NewTaskLog::new(updated.id, principal.user.id, action.log_action())
            .status_change(task.status, updated.status)
            .details(details),
    )
    .await?;

    notify(state, &updated, principal.user.id);

    tracing::info!(
        task_id = %updated.id,
        from = %task.status,
        to = %updated.status,
        actor_id = %principal.user.id,
        "Task status changed"
    );

    Ok(updated)
}

pub async fn start_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(apply_action(&state, &auth, task_id, TaskAction::Start, None).await?))
}

pub async fn submit_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(apply_action(&state, &auth, task_id, TaskAction::Submit, None).await?))
}

/// `POST /api/tasks/:id/approve`, optional body `{ "note": "..." }`
pub async fn approve_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    body: Option<Json<ReviewRequest>>,
) -> ApiResult<Json<Task>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    validate_request(&req)?;
    let note = req.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    Ok(Json(apply_action(&state, &auth, task_id, TaskAction::Approve, note).await?))
}

/// `POST /api/tasks/:id/reject` with `{ "reason": "..." }`
pub async fn reject_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<Task>> {
    validate_request(&req)?;
    let reason = req.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::invalid("reason", "Reason cannot be blank"));
    }

    Ok(Json(apply_action(&state, &auth, task_id, TaskAction::Reject, Some(reason)).await?))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TaskComment>>> {
    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;
    Ok(Json(TaskComment::list_by_task(&state.db, task.id).await?))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<TaskComment>)> {
    validate_request(&req)?;
    let body = req.body.trim();
    if body.is_empty() {
        return Err(ApiError::invalid("body", "Comment cannot be blank"));
    }

    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;

    let comment = TaskComment::create(&state.db, task.id, principal.user.id, body).await?;
    TaskLog::record(
        &state.db,
        NewTaskLog::new(task.id, principal.user.id, "commented").details(json!({ "comment_id": comment.id })),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Comments can only be deleted by their author
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((task_id, comment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;

    let comment = TaskComment::find(&state.db, task.id, comment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    if comment.author_id != Some(principal.user.id) {
        return Err(AuthzError::NotAuthorized.into());
    }

    TaskComment::delete(&state.db, task.id, comment.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TaskAttachment>>> {
    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;
    Ok(Json(TaskAttachment::list_by_task(&state.db, task.id).await?))
}

/// Upload an attachment
///
/// ```text
/// POST /api/tasks/:id/attachments
/// Content-Type: multipart/form-data; boundary=...
///
/// --boundary
/// Content-Disposition: form-data; name="file"; filename="report.pdf"
/// ```
///
/// The first part carrying a file name is stored; other parts are ignored.
/// Files over `MAX_UPLOAD_BYTES` are rejected with 413 and nothing is kept.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<TaskAttachment>)> {
    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(sanitize_file_name) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let attachment_id = Uuid::new_v4();
        let key = AttachmentStore::key_for(task.organization_id, task.id, attachment_id);
        let stored = state.store.save(&key, Box::pin(field)).await?;

        let created = TaskAttachment::create(
            &state.db,
            CreateTaskAttachment {
                id: attachment_id,
                task_id: task.id,
                uploaded_by: principal.user.id,
                file_name,
                content_type,
                size_bytes: stored.size_bytes,
                storage_key: stored.key,
            },
        )
        .await;

        let attachment = match created {
            Ok(attachment) => attachment,
            Err(e) => {
                let _ = state.store.delete(&key).await;
                return Err(e.into());
            }
        };

        TaskLog::record(
            &state.db,
            NewTaskLog::new(task.id, principal.user.id, "attachment_added").details(json!({
                "attachment_id": attachment.id,
                "file_name": attachment.file_name,
                "size_bytes": attachment.size_bytes,
            })),
        )
        .await?;

        return Ok((StatusCode::CREATED, Json(attachment)));
    }

    Err(ApiError::invalid("file", "No file part in the upload"))
}

/// `Content-Disposition` with an ASCII `filename` fallback and the exact
/// name as an RFC 5987 `filename*`
fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();

    let mut encoded = String::with_capacity(file_name.len());
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    ))
    .unwrap_or(HeaderValue::from_static("attachment"))
}

fn download_headers(attachment: &TaskAttachment) -> [(header::HeaderName, HeaderValue); 3] {
    let content_type = HeaderValue::from_str(&attachment.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));

    [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, content_disposition(&attachment.file_name)),
        (header::CACHE_CONTROL, HeaderValue::from_static("private, no-store")),
    ]
}

pub async fn download_attachment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((task_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Response> {
    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;

    let attachment = TaskAttachment::find(&state.db, task.id, attachment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Attachment not found".to_string()))?;

    let bytes = state.store.read(&attachment.storage_key).await?;

    Ok((download_headers(&attachment), Body::from(bytes)).into_response())
}

/// The uploader, the task's creator or `tasks:delete` holders may remove
pub async fn delete_attachment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((task_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;

    let attachment = TaskAttachment::find(&state.db, task.id, attachment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Attachment not found".to_string()))?;

    if attachment.uploaded_by != Some(principal.user.id) {
        principal.require_owner_or(task.created_by, Permission::TasksDelete)?;
    }

    TaskAttachment::delete(&state.db, task.id, attachment.id).await?;
    state.store.delete(&attachment.storage_key).await?;

    TaskLog::record(
        &state.db,
        NewTaskLog::new(task.id, principal.user.id, "attachment_removed").details(json!({
            "attachment_id": attachment.id,
            "file_name": attachment.file_name,
        })),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TaskLog>>> {
    let principal = load_principal(&state.db, &auth).await?;
    let task = visible_task(&state, &principal, task_id).await?;
    Ok(Json(TaskLog::list_by_task(&state.db, task.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_keeps_unicode_names() {
        let value = content_disposition("résumé 2024.pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"r_sum_ 2024.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9%202024.pdf"
        );

        let value = content_disposition("report.pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
    }

    #[test]
    fn test_update_request_tracks_present_fields() {
        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"title":"New","assigned_to":null}"#).unwrap();

        assert_eq!(req.changed_fields(), ["title", "assigned_to"]);
        assert_eq!(req.assigned_to, Some(None));

        let update = req.into_update();
        assert_eq!(update.title.as_deref(), Some("New"));
        assert_eq!(update.assigned_to, Some(None));
        assert!(update.description.is_none());
    }

    #[test]
    fn test_empty_update_has_no_fields() {
        let req: UpdateTaskRequest = serde_json::from_str("{}").unwrap();
        assert!(req.changed_fields().is_empty());
        assert!(req.into_update().is_empty());
    }

    #[test]
    fn test_create_request_defaults_and_validation() {
        let req: CreateTaskRequest = serde_json::from_str(r#"{"title":"Write docs"}"#).unwrap();
        assert_eq!(req.priority, TaskPriority::Medium);
        assert!(req.validate().is_ok());

        let req: CreateTaskRequest =
            serde_json::from_str(r#"{"title":"","priority":"urgent"}"#).unwrap();
        assert!(req.validate().is_err());

        assert!(serde_json::from_str::<CreateTaskRequest>(r#"{"title":"x","priority":"asap"}"#).is_err());
    }

    #[test]
    fn test_list_query_parses_status() {
        let query: ListTasksQuery = serde_json::from_str(r#"{"status":"under_review"}"#).unwrap();
        assert_eq!(query.status, Some(TaskStatus::UnderReview));
    }

    #[test]
    fn test_reject_requires_reason() {
        let req = RejectRequest { reason: String::new() };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_download_headers() {
        let attachment = TaskAttachment {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            uploaded_by: None,
            file_name: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 10,
            storage_key: "k".to_string(),
            created_at: Utc::now(),
        };

        let headers = download_headers(&attachment);
        assert_eq!(headers[0].1, "application/pdf");
        assert_eq!(headers[1].1, "attachment; filename=\"report.pdf\"");

        let odd = TaskAttachment {
            content_type: "bad\nvalue".to_string(),
            ..attachment
        };
        assert_eq!(download_headers(&odd)[0].1, "application/octet-stream");
    }
}
