/// Study plan model and database operations
///
/// A study plan belongs to one user (by identity-provider ID) and groups the
/// study tasks leading up to an exam. Deleting a plan deletes its tasks.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE study_plans (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id VARCHAR(255) NOT NULL,
///     title VARCHAR(255) NOT NULL,
///     subject VARCHAR(255) NOT NULL,
///     description TEXT,
///     exam_date TIMESTAMPTZ NOT NULL,
///     start_date TIMESTAMPTZ NOT NULL,
///     end_date TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// A user's plan of study for one exam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudyPlan {
    pub id: Uuid,

    /// Owner's identity-provider ID
    pub user_id: String,

    pub title: String,

    pub subject: String,

    pub description: Option<String>,

    pub exam_date: DateTime<Utc>,

    pub start_date: DateTime<Utc>,

    pub end_date: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl StudyPlan {
    /// Whether `clerk_id` owns this plan
    pub fn is_owned_by(&self, clerk_id: &str) -> bool {
        self.user_id == clerk_id
    }
}

/// Input for creating a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStudyPlan {
    pub user_id: String,
    pub title: String,
    pub subject: String,
    pub description: Option<String>,
    pub exam_date: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Replacement values for an existing plan
///
/// The owner cannot be changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStudyPlan {
    pub title: String,
    pub subject: String,
    pub description: Option<String>,
    pub exam_date: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl StudyPlan {
    pub async fn create(pool: &PgPool, data: CreateStudyPlan) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, StudyPlan>(
            r#"
            INSERT INTO study_plans (user_id, title, subject, description, exam_date, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, title, subject, description, exam_date, start_date, end_date,
                      created_at, updated_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.title)
        .bind(data.subject)
        .bind(data.description)
        .bind(data.exam_date)
        .bind(data.start_date)
        .bind(data.end_date)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, StudyPlan>(
            r#"
            SELECT id, user_id, title, subject, description, exam_date, start_date, end_date,
                   created_at, updated_at
            FROM study_plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// All plans owned by `user_id`, newest first
    pub async fn list_by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, StudyPlan>(
            r#"
            SELECT id, user_id, title, subject, description, exam_date, start_date, end_date,
                   created_at, updated_at
            FROM study_plans
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Overwrites the plan's editable fields
    ///
    /// Returns None if the plan no longer exists.
    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateStudyPlan) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, StudyPlan>(
            r#"
            UPDATE study_plans
            SET title = $2,
                subject = $3,
                description = $4,
                exam_date = $5,
                start_date = $6,
                end_date = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, title, subject, description, exam_date, start_date, end_date,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.title)
        .bind(data.subject)
        .bind(data.description)
        .bind(data.exam_date)
        .bind(data.start_date)
        .bind(data.end_date)
        .fetch_optional(pool)
        .await
    }

    /// Deletes the plan and, via the foreign key, its tasks
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM study_plans WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_owned_by() {
        let now = Utc::now();
        let plan = StudyPlan {
            id: Uuid::new_v4(),
            user_id: "user_owner".to_string(),
            title: "Finals".to_string(),
            subject: "Chemistry".to_string(),
            description: None,
            exam_date: now,
            start_date: now,
            end_date: now,
            created_at: now,
            updated_at: now,
        };

        assert!(plan.is_owned_by("user_owner"));
        assert!(!plan.is_owned_by("user_other"));
        assert!(!plan.is_owned_by(""));
    }
}
