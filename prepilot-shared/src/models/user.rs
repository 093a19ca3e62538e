/// User model and database operations
///
/// Users are owned by the identity provider. Rows are created and refreshed
/// by webhook sync (keyed by `clerk_id`), or lazily provisioned the first time
/// an authenticated request arrives before the webhook does.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     clerk_id VARCHAR(255) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     name VARCHAR(255),
///     first_name VARCHAR(255),
///     last_name VARCHAR(255),
///     image_url TEXT,
///     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     last_sign_in_at TIMESTAMPTZ,
///     banned BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use prepilot_shared::models::user::{User, UpsertUser};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::upsert_by_clerk_id(&pool, UpsertUser {
///     clerk_id: "user_2abc".to_string(),
///     email: "ada@example.com".to_string(),
///     first_name: Some("Ada".to_string()),
///     last_name: Some("Lovelace".to_string()),
///     name: Some("Ada Lovelace".to_string()),
///     image_url: None,
///     email_verified: true,
///     last_sign_in_at: None,
///     banned: false,
/// })
/// .await?;
///
/// let found = User::find_by_clerk_id(&pool, "user_2abc").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, clerk_id, email, name, first_name, last_name, image_url, \
                            email_verified, last_sign_in_at, banned, created_at, updated_at";

/// A locally mirrored identity-provider user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Identity-provider user ID (`user_...`)
    pub clerk_id: String,

    /// Primary email address, unique across users
    pub email: String,

    /// Display name derived from first/last name
    pub name: Option<String>,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    pub image_url: Option<String>,

    pub email_verified: bool,

    /// Last time a session was created for this user
    pub last_sign_in_at: Option<DateTime<Utc>>,

    pub banned: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Full user record as delivered by a webhook
///
/// Used for create-or-replace keyed by `clerk_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertUser {
    pub clerk_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub email_verified: bool,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub banned: bool,
}

/// Partial update of an existing user
///
/// Only `Some` fields are written. Nullable columns use `Option<Option<T>>`;
/// `Some(None)` clears the column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub name: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub email_verified: Option<bool>,
    pub last_sign_in_at: Option<Option<DateTime<Utc>>>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self == &UpdateUser::default()
    }
}

impl User {
    /// Inserts the user, or overwrites the existing row with the same `clerk_id`
    ///
    /// Replaying the same payload leaves a single, identical row.
    ///
    /// # Errors
    ///
    /// Returns an error if another user already owns `email`, or if the
    /// database is unreachable.
    pub async fn upsert_by_clerk_id<'e>(
        executor: impl PgExecutor<'e>,
        data: UpsertUser,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (clerk_id, email, first_name, last_name, name, image_url,
                               email_verified, last_sign_in_at, banned)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (clerk_id) DO UPDATE SET
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                name = EXCLUDED.name,
                image_url = EXCLUDED.image_url,
                email_verified = EXCLUDED.email_verified,
                last_sign_in_at = EXCLUDED.last_sign_in_at,
                banned = EXCLUDED.banned,
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.clerk_id)
            .bind(data.email)
            .bind(data.first_name)
            .bind(data.last_name)
            .bind(data.name)
            .bind(data.image_url)
            .bind(data.email_verified)
            .bind(data.last_sign_in_at)
            .bind(data.banned)
            .fetch_one(executor)
            .await
    }

    /// Finds a user by identity-provider ID
    pub async fn find_by_clerk_id(pool: &PgPool, clerk_id: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE clerk_id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(clerk_id)
            .fetch_optional(pool)
            .await
    }

    /// Updates the given fields of the user with `clerk_id`
    ///
    /// `updated_at` is always bumped. Returns None when no such user exists.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use prepilot_shared::models::user::{User, UpdateUser};
    /// # use sqlx::PgPool;
    /// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
    /// let update = UpdateUser {
    ///     name: Some(None),
    ///     email_verified: Some(true),
    ///     ..Default::default()
    /// };
    ///
    /// if let Some(user) = User::update_by_clerk_id(&pool, "user_2abc", update).await? {
    ///     assert!(user.name.is_none());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn update_by_clerk_id<'e>(
        executor: impl PgExecutor<'e>,
        clerk_id: &str,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        // Build dynamic update query based on which fields are present
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        let mut push = |column: &str, present: bool| {
            if present {
                bind_count += 1;
                query.push_str(&format!(", {column} = ${bind_count}"));
            }
        };
        push("email", data.email.is_some());
        push("first_name", data.first_name.is_some());
        push("last_name", data.last_name.is_some());
        push("name", data.name.is_some());
        push("image_url", data.image_url.is_some());
        push("email_verified", data.email_verified.is_some());
        push("last_sign_in_at", data.last_sign_in_at.is_some());

        query.push_str(&format!(" WHERE clerk_id = $1 RETURNING {USER_COLUMNS}"));

        let mut q = sqlx::query_as::<_, User>(&query).bind(clerk_id);

        if let Some(email) = data.email {
            q = q.bind(email);
        }
        if let Some(first_name) = data.first_name {
            q = q.bind(first_name);
        }
        if let Some(last_name) = data.last_name {
            q = q.bind(last_name);
        }
        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(image_url) = data.image_url {
            q = q.bind(image_url);
        }
        if let Some(verified) = data.email_verified {
            q = q.bind(verified);
        }
        if let Some(last_sign_in_at) = data.last_sign_in_at {
            q = q.bind(last_sign_in_at);
        }

        q.fetch_optional(executor).await
    }

    /// Sets or clears the ban flag
    ///
    /// Returns false when no user has `clerk_id`.
    pub async fn set_banned<'e>(
        executor: impl PgExecutor<'e>,
        clerk_id: &str,
        banned: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET banned = $2, updated_at = NOW()
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .bind(banned)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records a sign-in at the current time
    pub async fn touch_last_sign_in(pool: &PgPool, clerk_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_sign_in_at = NOW(), updated_at = NOW()
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Permanently deletes the user with `clerk_id`
    ///
    /// Returns false when there was nothing to delete.
    pub async fn delete_by_clerk_id(pool: &PgPool, clerk_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE clerk_id = $1")
            .bind(clerk_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Makes sure a row exists for `clerk_id`, creating a bare one if needed
    ///
    /// An existing row is left untouched, so concurrent first requests for
    /// the same identity are safe. Returns the stored row either way.
    ///
    /// # Errors
    ///
    /// Returns `RowNotFound` if the insert was skipped because `email`
    /// belongs to a different user.
    pub async fn ensure_exists(pool: &PgPool, clerk_id: &str, email: &str) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (clerk_id, email)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(clerk_id)
        .bind(email)
        .execute(pool)
        .await?;

        Self::find_by_clerk_id(pool, clerk_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }
}
