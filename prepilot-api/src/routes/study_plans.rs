/// Study plan endpoints
///
/// Every plan belongs to the caller that created it. Reads and writes of a
/// single plan check ownership after the lookup, so a plan that exists but
/// belongs to someone else yields 403 rather than 404.
///
/// # Endpoints
///
/// - `POST   /v1/study-plans`
/// - `GET    /v1/study-plans`
/// - `GET    /v1/study-plans/:id`
/// - `PUT    /v1/study-plans/:id`
/// - `DELETE /v1/study-plans/:id`
/// - `GET    /v1/study-plans/:id/tasks`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Data, ValidatedJson},
    middleware::auth::AuthUser,
};
use axum::{
    extract::{Path, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use prepilot_shared::models::study_plan::{CreateStudyPlan, StudyPlan, UpdateStudyPlan};
use prepilot_shared::models::study_task::StudyTask;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Body of create and update requests
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_date_range"))]
pub struct StudyPlanRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 255, message = "Subject must be between 1 and 255 characters"))]
    pub subject: String,

    pub description: Option<String>,

    pub exam_date: DateTime<Utc>,

    pub start_date: DateTime<Utc>,

    pub end_date: DateTime<Utc>,
}

fn validate_date_range(req: &StudyPlanRequest) -> Result<(), ValidationError> {
    if req.start_date > req.end_date {
        let mut err = ValidationError::new("date_range");
        err.message = Some("start_date must not be after end_date".into());
        return Err(err);
    }
    Ok(())
}

/// Parses a path ID, answering 400 on malformed input
pub(crate) fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid ID {:?}: {}", raw, e)))
}

/// Loads a plan and checks the caller owns it
pub(crate) async fn owned_plan(db: &PgPool, id: Uuid, clerk_id: &str) -> ApiResult<StudyPlan> {
    let plan = StudyPlan::find_by_id(db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Study plan not found".to_string()))?;

    if !plan.is_owned_by(clerk_id) {
        tracing::warn!(plan_id = %id, clerk_id, "Study plan access denied");
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }

    Ok(plan)
}

pub async fn create_study_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<StudyPlanRequest>,
) -> ApiResult<Response> {
    let plan = StudyPlan::create(
        &state.db,
        CreateStudyPlan {
            user_id: auth.clerk_id,
            title: req.title,
            subject: req.subject,
            description: req.description,
            exam_date: req.exam_date,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?;

    tracing::info!(plan_id = %plan.id, clerk_id = %plan.user_id, "Created study plan");

    Ok(Data::created(plan))
}

pub async fn list_study_plans(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Data<Vec<StudyPlan>>> {
    let plans = StudyPlan::list_by_user(&state.db, &auth.clerk_id).await?;
    Ok(Data { data: plans })
}

pub async fn get_study_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Data<StudyPlan>> {
    let plan = owned_plan(&state.db, parse_id(&id)?, &auth.clerk_id).await?;
    Ok(Data { data: plan })
}

pub async fn update_study_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<StudyPlanRequest>,
) -> ApiResult<Data<StudyPlan>> {
    let id = parse_id(&id)?;
    owned_plan(&state.db, id, &auth.clerk_id).await?;

    let plan = StudyPlan::update(
        &state.db,
        id,
        UpdateStudyPlan {
            title: req.title,
            subject: req.subject,
            description: req.description,
            exam_date: req.exam_date,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Study plan not found".to_string()))?;

    Ok(Data { data: plan })
}

/// Deletes the plan together with its tasks
pub async fn delete_study_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Data<serde_json::Value>> {
    let id = parse_id(&id)?;
    owned_plan(&state.db, id, &auth.clerk_id).await?;

    if !StudyPlan::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Study plan not found".to_string()));
    }

    tracing::info!(plan_id = %id, clerk_id = %auth.clerk_id, "Deleted study plan");

    Ok(Data {
        data: json!({ "message": "Study plan deleted successfully" }),
    })
}

pub async fn list_plan_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Data<Vec<StudyTask>>> {
    let plan = owned_plan(&state.db, parse_id(&id)?, &auth.clerk_id).await?;
    let tasks = StudyTask::list_by_plan(&state.db, plan.id).await?;
    Ok(Data { data: tasks })
}
