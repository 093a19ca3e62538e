/// Study task endpoints
///
/// Tasks may belong to a plan or stand alone. Either way the owner column
/// decides access: a task owned by someone else answers 403.
///
/// # Endpoints
///
/// - `POST   /v1/study-tasks`
/// - `GET    /v1/study-tasks?plan_id=&priority=&status=`
/// - `GET    /v1/study-tasks/overdue?plan_id=`
/// - `GET    /v1/study-tasks/:id`
/// - `PUT    /v1/study-tasks/:id`
/// - `DELETE /v1/study-tasks/:id`
/// - `PATCH  /v1/study-tasks/:id/status`

use super::study_plans::{owned_plan, parse_id};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Data, ValidatedJson},
    middleware::auth::AuthUser,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use prepilot_shared::models::study_task::{CreateStudyTask, StudyTask, TaskFilter, UpdateStudyTask};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateStudyTaskRequest {
    pub plan_id: Option<Uuid>,

    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,

    pub due_date: DateTime<Utc>,

    pub is_completed: Option<bool>,

    pub priority: Option<i32>,

    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateStudyTaskRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,

    pub due_date: DateTime<Utc>,

    #[serde(default)]
    pub is_completed: bool,

    pub priority: Option<i32>,

    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub is_completed: bool,
}

/// Raw list filters; empty values count as absent
#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
    pub plan_id: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts the boolean spellings `1 t T TRUE true True 0 f F FALSE false False`
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn parse_plan_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid plan_id {:?}: {}", raw, e)))
}

impl TaskListParams {
    /// Picks the filter, parsing only the parameters it uses
    ///
    /// Precedence: plan + priority, plan + status, plan, then all of the
    /// caller's tasks. Without a plan, priority and status are ignored.
    pub fn to_filter(&self) -> ApiResult<TaskFilter> {
        let Some(plan_id) = present(&self.plan_id) else {
            return Ok(TaskFilter::AllForUser);
        };
        let plan_id = parse_plan_id(plan_id)?;

        if let Some(priority) = present(&self.priority) {
            let priority = priority
                .parse::<i32>()
                .map_err(|e| ApiError::BadRequest(format!("Invalid priority {:?}: {}", priority, e)))?;
            return Ok(TaskFilter::PlanAndPriority { plan_id, priority });
        }

        if let Some(status) = present(&self.status) {
            let is_completed = parse_bool(status)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid status {:?}: expected a boolean", status)))?;
            return Ok(TaskFilter::PlanAndStatus { plan_id, is_completed });
        }

        Ok(TaskFilter::Plan(plan_id))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OverdueParams {
    pub plan_id: Option<String>,
}

/// Loads a task and checks the caller owns it
async fn owned_task(db: &PgPool, id: Uuid, clerk_id: &str) -> ApiResult<StudyTask> {
    let task = StudyTask::find_by_id(db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    if !task.is_owned_by(clerk_id) {
        tracing::warn!(task_id = %id, clerk_id, "Study task access denied");
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }

    Ok(task)
}

fn message(text: &str) -> Data<Value> {
    Data {
        data: json!({ "message": text }),
    }
}

pub async fn create_study_task(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateStudyTaskRequest>,
) -> ApiResult<Response> {
    if let Some(plan_id) = req.plan_id {
        owned_plan(&state.db, plan_id, &auth.clerk_id).await?;
    }

    let task = StudyTask::create(
        &state.db,
        CreateStudyTask {
            plan_id: req.plan_id,
            user_id: auth.clerk_id,
            title: req.title,
            due_date: req.due_date,
            is_completed: req.is_completed.unwrap_or(false),
            priority: req.priority,
            notes: req.notes,
        },
    )
    .await?;

    tracing::info!(task_id = %task.id, plan_id = ?task.plan_id, "Created study task");

    Ok(Data::created(task))
}

pub async fn list_study_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<TaskListParams>,
) -> ApiResult<Data<Vec<StudyTask>>> {
    let filter = params.to_filter()?;

    if let Some(plan_id) = filter.plan_id() {
        owned_plan(&state.db, plan_id, &auth.clerk_id).await?;
    }

    let tasks = StudyTask::list(&state.db, &auth.clerk_id, &filter).await?;
    Ok(Data { data: tasks })
}

/// Incomplete tasks whose due date is before today
pub async fn list_overdue_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<OverdueParams>,
) -> ApiResult<Data<Vec<StudyTask>>> {
    let plan_id = present(&params.plan_id).map(parse_plan_id).transpose()?;

    if let Some(plan_id) = plan_id {
        owned_plan(&state.db, plan_id, &auth.clerk_id).await?;
    }

    let tasks = StudyTask::list_overdue(&state.db, &auth.clerk_id, plan_id).await?;
    Ok(Data { data: tasks })
}

pub async fn get_study_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Data<StudyTask>> {
    let task = owned_task(&state.db, parse_id(&id)?, &auth.clerk_id).await?;
    Ok(Data { data: task })
}

pub async fn update_study_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateStudyTaskRequest>,
) -> ApiResult<Data<StudyTask>> {
    let id = parse_id(&id)?;
    owned_task(&state.db, id, &auth.clerk_id).await?;

    let task = StudyTask::update(
        &state.db,
        id,
        UpdateStudyTask {
            title: req.title,
            due_date: req.due_date,
            is_completed: req.is_completed,
            priority: req.priority,
            notes: req.notes,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(Data { data: task })
}

pub async fn delete_study_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Data<Value>> {
    let id = parse_id(&id)?;
    owned_task(&state.db, id, &auth.clerk_id).await?;

    if !StudyTask::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    Ok(message("Task deleted successfully"))
}

pub async fn update_task_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> ApiResult<Data<Value>> {
    let id = parse_id(&id)?;
    owned_task(&state.db, id, &auth.clerk_id).await?;

    StudyTask::update_status(&state.db, id, req.is_completed)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(message("Task status updated successfully"))
}
