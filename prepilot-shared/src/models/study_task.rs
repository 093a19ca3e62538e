/// Study task model and database operations
///
/// A task either belongs to a study plan or stands alone (`plan_id` is
/// NULL). Every task also records its owner so standalone tasks can be
/// authorized the same way as planned ones.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE study_tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     plan_id UUID REFERENCES study_plans (id) ON DELETE CASCADE,
///     user_id VARCHAR(255) NOT NULL,
///     title VARCHAR(255) NOT NULL,
///     due_date TIMESTAMPTZ NOT NULL,
///     is_completed BOOLEAN NOT NULL DEFAULT FALSE,
///     priority INTEGER,
///     notes TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use prepilot_shared::models::study_task::{StudyTask, TaskFilter};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, plan_id: Uuid) -> Result<(), sqlx::Error> {
/// // High-priority tasks of one plan
/// let filter = TaskFilter::from_params(Some(plan_id), Some(1), None);
/// let tasks = StudyTask::list(&pool, "user_2abc", &filter).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const TASK_COLUMNS: &str =
    "id, plan_id, user_id, title, due_date, is_completed, priority, notes, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudyTask {
    pub id: Uuid,

    /// Parent plan, None for a standalone task
    pub plan_id: Option<Uuid>,

    /// Owner's identity-provider ID
    pub user_id: String,

    pub title: String,

    pub due_date: DateTime<Utc>,

    pub is_completed: bool,

    pub priority: Option<i32>,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl StudyTask {
    pub fn is_owned_by(&self, clerk_id: &str) -> bool {
        self.user_id == clerk_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStudyTask {
    pub plan_id: Option<Uuid>,
    pub user_id: String,
    pub title: String,
    pub due_date: DateTime<Utc>,
    pub is_completed: bool,
    pub priority: Option<i32>,
    pub notes: Option<String>,
}

/// Replacement values for an existing task
///
/// The plan and owner cannot be changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStudyTask {
    pub title: String,
    pub due_date: DateTime<Utc>,
    pub is_completed: bool,
    pub priority: Option<i32>,
    pub notes: Option<String>,
}

/// Which subset of tasks a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    PlanAndPriority { plan_id: Uuid, priority: i32 },
    PlanAndStatus { plan_id: Uuid, is_completed: bool },
    Plan(Uuid),
    /// Every task owned by the caller, planned or standalone
    AllForUser,
}

impl TaskFilter {
    /// Picks the filter from optional query parameters
    ///
    /// Precedence is plan+priority, then plan+status, then plan alone.
    /// Priority and status are ignored without a plan.
    pub fn from_params(plan_id: Option<Uuid>, priority: Option<i32>, is_completed: Option<bool>) -> Self {
        match (plan_id, priority, is_completed) {
            (Some(plan_id), Some(priority), _) => TaskFilter::PlanAndPriority { plan_id, priority },
            (Some(plan_id), None, Some(is_completed)) => TaskFilter::PlanAndStatus { plan_id, is_completed },
            (Some(plan_id), None, None) => TaskFilter::Plan(plan_id),
            (None, _, _) => TaskFilter::AllForUser,
        }
    }

    /// The plan this filter is scoped to, if any
    pub fn plan_id(&self) -> Option<Uuid> {
        match self {
            TaskFilter::PlanAndPriority { plan_id, .. }
            | TaskFilter::PlanAndStatus { plan_id, .. }
            | TaskFilter::Plan(plan_id) => Some(*plan_id),
            TaskFilter::AllForUser => None,
        }
    }
}

impl StudyTask {
    pub async fn create(pool: &PgPool, data: CreateStudyTask) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO study_tasks (plan_id, user_id, title, due_date, is_completed, priority, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TASK_COLUMNS}
            "#
        );

        sqlx::query_as::<_, StudyTask>(&query)
            .bind(data.plan_id)
            .bind(data.user_id)
            .bind(data.title)
            .bind(data.due_date)
            .bind(data.is_completed)
            .bind(data.priority)
            .bind(data.notes)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {TASK_COLUMNS} FROM study_tasks WHERE id = $1");

        sqlx::query_as::<_, StudyTask>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Lists tasks matching `filter`, earliest due first
    ///
    /// Plan-scoped filters do not check plan ownership; callers verify the
    /// plan belongs to `user_id` first.
    pub async fn list(pool: &PgPool, user_id: &str, filter: &TaskFilter) -> Result<Vec<Self>, sqlx::Error> {
        let tasks = match *filter {
            TaskFilter::PlanAndPriority { plan_id, priority } => {
                let query = format!(
                    "SELECT {TASK_COLUMNS} FROM study_tasks \
                     WHERE plan_id = $1 AND priority = $2 ORDER BY due_date ASC"
                );
                sqlx::query_as::<_, StudyTask>(&query)
                    .bind(plan_id)
                    .bind(priority)
                    .fetch_all(pool)
                    .await?
            }
            TaskFilter::PlanAndStatus { plan_id, is_completed } => {
                let query = format!(
                    "SELECT {TASK_COLUMNS} FROM study_tasks \
                     WHERE plan_id = $1 AND is_completed = $2 ORDER BY due_date ASC"
                );
                sqlx::query_as::<_, StudyTask>(&query)
                    .bind(plan_id)
                    .bind(is_completed)
                    .fetch_all(pool)
                    .await?
            }
            TaskFilter::Plan(plan_id) => Self::list_by_plan(pool, plan_id).await?,
            TaskFilter::AllForUser => {
                let query = format!(
                    "SELECT {TASK_COLUMNS} FROM study_tasks WHERE user_id = $1 ORDER BY due_date ASC"
                );
                sqlx::query_as::<_, StudyTask>(&query)
                    .bind(user_id)
                    .fetch_all(pool)
                    .await?
            }
        };

        Ok(tasks)
    }

    pub async fn list_by_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM study_tasks WHERE plan_id = $1 ORDER BY due_date ASC"
        );

        sqlx::query_as::<_, StudyTask>(&query)
            .bind(plan_id)
            .fetch_all(pool)
            .await
    }

    /// Incomplete tasks due before today, optionally limited to one plan
    pub async fn list_overdue(
        pool: &PgPool,
        user_id: &str,
        plan_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM study_tasks
            WHERE user_id = $1
              AND ($2::UUID IS NULL OR plan_id = $2)
              AND due_date < CURRENT_DATE
              AND is_completed = FALSE
            ORDER BY due_date ASC
            "#
        );

        sqlx::query_as::<_, StudyTask>(&query)
            .bind(user_id)
            .bind(plan_id)
            .fetch_all(pool)
            .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateStudyTask) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE study_tasks
            SET title = $2,
                due_date = $3,
                is_completed = $4,
                priority = $5,
                notes = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        );

        sqlx::query_as::<_, StudyTask>(&query)
            .bind(id)
            .bind(data.title)
            .bind(data.due_date)
            .bind(data.is_completed)
            .bind(data.priority)
            .bind(data.notes)
            .fetch_optional(pool)
            .await
    }

    /// Flips only the completion flag
    pub async fn update_status(pool: &PgPool, id: Uuid, is_completed: bool) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE study_tasks SET is_completed = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {TASK_COLUMNS}"
        );

        sqlx::query_as::<_, StudyTask>(&query)
            .bind(id)
            .bind(is_completed)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM study_tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
