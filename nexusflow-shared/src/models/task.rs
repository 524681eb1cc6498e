/// Task model and database operations
///
/// Tasks are the unit of work assigned inside an organization. Status moves
/// through a small review workflow:
///
/// ```text
/// to_do ──start──▶ in_progress ──submit──▶ under_review ──approve──▶ completed
///                      ▲                        │
///                      └───────start─── rejected ◀──reject──┘
/// ```
///
/// Every transition is written with `WHERE status = <expected>`, so two
/// people acting on the same task at once cannot both succeed; the loser
/// gets no row back and the API answers 409.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('to_do', 'in_progress', 'under_review', 'completed', 'rejected');
/// CREATE TYPE task_priority AS ENUM ('low', 'medium', 'high', 'urgent');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     title VARCHAR(200) NOT NULL,
///     description TEXT,
///     status task_status NOT NULL DEFAULT 'to_do',
///     priority task_priority NOT NULL DEFAULT 'medium',
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     assigned_to UUID REFERENCES users(id) ON DELETE SET NULL,
///     due_date TIMESTAMPTZ,
///     started_at TIMESTAMPTZ,
///     submitted_at TIMESTAMPTZ,
///     completed_at TIMESTAMPTZ,
///     review_note TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::models::task::{Task, CreateTask, TaskAction, TaskPriority};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, org_id: Uuid, me: Uuid) -> Result<(), sqlx::Error> {
/// let task = Task::create(&pool, CreateTask {
///     organization_id: org_id,
///     title: "Prepare Q3 report".to_string(),
///     description: None,
///     priority: TaskPriority::High,
///     created_by: Some(me),
///     assigned_to: Some(me),
///     due_date: None,
/// }).await?;
///
/// let started = Task::transition(&pool, &task, TaskAction::Start, None).await?;
/// assert!(started.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    ToDo,
    InProgress,
    UnderReview,
    Completed,
    Rejected,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::ToDo => "to_do",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::UnderReview => "under_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Rejected => "rejected",
        }
    }

    /// Only completed tasks are final; rejected work goes back to the assignee.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Checks if moving to `target` follows the workflow
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::ToDo, TaskStatus::InProgress)
                | (TaskStatus::Rejected, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::UnderReview)
                | (TaskStatus::UnderReview, TaskStatus::Completed)
                | (TaskStatus::UnderReview, TaskStatus::Rejected)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_do" => Ok(TaskStatus::ToDo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "under_review" => Ok(TaskStatus::UnderReview),
            "completed" => Ok(TaskStatus::Completed),
            "rejected" => Ok(TaskStatus::Rejected),
            other => Err(format!("Unknown task status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A workflow step requested through the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Start,
    Submit,
    Approve,
    Reject,
}

impl TaskAction {
    pub fn target(&self) -> TaskStatus {
        match self {
            TaskAction::Start => TaskStatus::InProgress,
            TaskAction::Submit => TaskStatus::UnderReview,
            TaskAction::Approve => TaskStatus::Completed,
            TaskAction::Reject => TaskStatus::Rejected,
        }
    }

    /// Approve and reject are review decisions; start and submit are the
    /// assignee's own steps.
    pub fn is_review(&self) -> bool {
        matches!(self, TaskAction::Approve | TaskAction::Reject)
    }

    /// Name written to the task log
    pub fn log_action(&self) -> &'static str {
        match self {
            TaskAction::Start => "started",
            TaskAction::Submit => "submitted",
            TaskAction::Approve => "approved",
            TaskAction::Reject => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,

    /// Creator; NULL once the creator's account is deleted
    pub created_by: Option<Uuid>,

    pub assigned_to: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,

    /// First time the task entered `in_progress`
    pub started_at: Option<DateTime<Utc>>,

    /// Latest submission for review
    pub submitted_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Reviewer's note from the latest approve/reject
    pub review_note: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// The person expected to start and submit the task: the assignee, or
    /// the creator while the task is unassigned.
    pub fn worker_id(&self) -> Option<Uuid> {
        self.assigned_to.or(self.created_by)
    }

    /// Checks if `user_id` created or is assigned the task
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.created_by == Some(user_id) || self.assigned_to == Some(user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Editable fields. Status is changed only through [`Task::transition`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<Option<Uuid>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl UpdateTask {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
            && self.due_date.is_none()
    }
}

/// List filter
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<Uuid>,

    /// When set, only tasks this user created or is assigned are returned
    pub visible_to: Option<Uuid>,
}

const TASK_COLUMNS: &str = "id, organization_id, title, description, status, priority, \
     created_by, assigned_to, due_date, started_at, submitted_at, completed_at, review_note, \
     created_at, updated_at";

impl Task {
    /// Inserts a task in `to_do`
    pub async fn create(pool: &PgPool, data: CreateTask) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (organization_id, title, description, priority, created_by, \
             assigned_to, due_date) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(data.organization_id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.priority)
            .bind(data.created_by)
            .bind(data.assigned_to)
            .bind(data.due_date)
            .fetch_one(pool)
            .await
    }

    /// Finds a task inside an organization
    pub async fn find_by_id_and_org(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM tasks WHERE id = $1 AND organization_id = $2",
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Builds the shared WHERE clause for [`Task::list`] and [`Task::count`].
    /// `$1` is always the organization; returns the clause and the next
    /// free placeholder number.
    fn filter_clause(filter: &TaskFilter) -> (String, usize) {
        let mut clause = String::from(" WHERE organization_id = $1");
        let mut bind_count = 1;

        if filter.status.is_some() {
            bind_count += 1;
            clause.push_str(&format!(" AND status = ${}", bind_count));
        }
        if filter.assigned_to.is_some() {
            bind_count += 1;
            clause.push_str(&format!(" AND assigned_to = ${}", bind_count));
        }
        if filter.visible_to.is_some() {
            bind_count += 1;
            clause.push_str(&format!(
                " AND (created_by = ${0} OR assigned_to = ${0})",
                bind_count
            ));
        }

        (clause, bind_count + 1)
    }

    /// Lists tasks, most recently updated first
    pub async fn list(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &TaskFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let (clause, next) = Self::filter_clause(filter);
        let query = format!(
            "SELECT {} FROM tasks{} ORDER BY updated_at DESC, id DESC LIMIT ${} OFFSET ${}",
            TASK_COLUMNS,
            clause,
            next,
            next + 1
        );

        let mut q = sqlx::query_as::<_, Task>(&query).bind(organization_id);

        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        if let Some(assigned_to) = filter.assigned_to {
            q = q.bind(assigned_to);
        }
        if let Some(visible_to) = filter.visible_to {
            q = q.bind(visible_to);
        }

        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Counts tasks matching `filter`
    pub async fn count(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<i64, sqlx::Error> {
        let (clause, _) = Self::filter_clause(filter);
        let query = format!("SELECT COUNT(*) FROM tasks{}", clause);

        let mut q = sqlx::query_as::<_, (i64,)>(&query).bind(organization_id);

        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        if let Some(assigned_to) = filter.assigned_to {
            q = q.bind(assigned_to);
        }
        if let Some(visible_to) = filter.visible_to {
            q = q.bind(visible_to);
        }

        let (count,) = q.fetch_one(pool).await?;
        Ok(count)
    }

    /// Updates the non-`None` editable fields
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE tasks SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.priority.is_some() {
            bind_count += 1;
            query.push_str(&format!(", priority = ${}", bind_count));
        }
        if data.assigned_to.is_some() {
            bind_count += 1;
            query.push_str(&format!(", assigned_to = ${}", bind_count));
        }
        if data.due_date.is_some() {
            bind_count += 1;
            query.push_str(&format!(", due_date = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND organization_id = $2 RETURNING {}",
            TASK_COLUMNS
        ));

        let mut q = sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(organization_id);

        if let Some(title) = data.title {
            q = q.bind(title);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(priority) = data.priority {
            q = q.bind(priority);
        }
        if let Some(assigned_to) = data.assigned_to {
            q = q.bind(assigned_to);
        }
        if let Some(due_date) = data.due_date {
            q = q.bind(due_date);
        }

        q.fetch_optional(pool).await
    }

    /// Applies a workflow step to `task`
    ///
    /// The write only succeeds while the row still has the status `task` was
    /// read with.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(task))` with the new status
    /// - `Ok(None)` when the status changed underneath us or the step isn't
    ///   allowed from the current status
    pub async fn transition(
        pool: &PgPool,
        task: &Task,
        action: TaskAction,
        note: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let target = action.target();
        if !task.status.can_transition_to(target) {
            return Ok(None);
        }

        let stamp = match action {
            TaskAction::Start => ", started_at = COALESCE(started_at, NOW())",
            TaskAction::Submit => ", submitted_at = NOW()",
            TaskAction::Approve => ", completed_at = NOW(), review_note = $5",
            TaskAction::Reject => ", review_note = $5",
        };

        let query = format!(
            "UPDATE tasks SET status = $3, updated_at = NOW(){} \
             WHERE id = $1 AND organization_id = $2 AND status = $4 RETURNING {}",
            stamp, TASK_COLUMNS
        );

        let mut q = sqlx::query_as::<_, Task>(&query)
            .bind(task.id)
            .bind(task.organization_id)
            .bind(target)
            .bind(task.status);

        if action.is_review() {
            q = q.bind(note);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a task together with its comments, attachments and log
    pub async fn delete(pool: &PgPool, id: Uuid, organization_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_as_str_roundtrip() {
        for status in [
            TaskStatus::ToDo,
            TaskStatus::InProgress,
            TaskStatus::UnderReview,
            TaskStatus::Completed,
            TaskStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_task_status_transitions() {
        use TaskStatus::*;

        assert!(ToDo.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(UnderReview));
        assert!(UnderReview.can_transition_to(Completed));
        assert!(UnderReview.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(InProgress));

        assert!(!ToDo.can_transition_to(Completed));
        assert!(!ToDo.can_transition_to(UnderReview));
        assert!(!InProgress.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Completed));
    }

    #[test]
    fn test_only_completed_is_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(!TaskStatus::Rejected.is_terminal());
        assert!(!TaskStatus::UnderReview.is_terminal());
    }

    #[test]
    fn test_task_action_targets() {
        assert_eq!(TaskAction::Start.target(), TaskStatus::InProgress);
        assert_eq!(TaskAction::Submit.target(), TaskStatus::UnderReview);
        assert_eq!(TaskAction::Approve.target(), TaskStatus::Completed);
        assert_eq!(TaskAction::Reject.target(), TaskStatus::Rejected);
        assert!(TaskAction::Reject.is_review());
        assert!(!TaskAction::Submit.is_review());
    }

    #[test]
    fn test_filter_clause_placeholders() {
        let (clause, next) = Task::filter_clause(&TaskFilter::default());
        assert_eq!(clause, " WHERE organization_id = $1");
        assert_eq!(next, 2);

        let filter = TaskFilter {
            status: Some(TaskStatus::ToDo),
            assigned_to: None,
            visible_to: Some(Uuid::new_v4()),
        };
        let (clause, next) = Task::filter_clause(&filter);
        assert!(clause.contains("status = $2"));
        assert!(clause.contains("(created_by = $3 OR assigned_to = $3)"));
        assert_eq!(next, 4);
    }

    #[test]
    fn test_worker_id_falls_back_to_creator() {
        let creator = Uuid::new_v4();
        let mut task = Task {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            title: "t".to_string(),
            description: None,
            status: TaskStatus::ToDo,
            priority: TaskPriority::default(),
            created_by: Some(creator),
            assigned_to: None,
            due_date: None,
            started_at: None,
            submitted_at: None,
            completed_at: None,
            review_note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(task.worker_id(), Some(creator));

        let assignee = Uuid::new_v4();
        task.assigned_to = Some(assignee);
        assert_eq!(task.worker_id(), Some(assignee));
        assert!(task.involves(creator));
        assert!(task.involves(assignee));
        assert!(!task.involves(Uuid::new_v4()));
    }
}
