/// Current user endpoints
///
/// - `POST /v1/user/initialize`: called right after sign-in; the auth
///   middleware has already provisioned the row
/// - `GET /v1/user/profile`
///
/// Both respond with the profile object itself, without the `data` envelope.

use crate::middleware::auth::AuthUser;
use axum::Json;
use chrono::{DateTime, Utc};
use prepilot_shared::models::user::User;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub clerk_id: String,
    pub email: String,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub email_verified: bool,
    pub last_sign_in: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            clerk_id: user.clerk_id,
            email: user.email,
            name: user.name,
            first_name: user.first_name,
            last_name: user.last_name,
            image_url: user.image_url,
            email_verified: user.email_verified,
            last_sign_in: user.last_sign_in_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
            message: None,
        }
    }
}

pub async fn initialize(auth: AuthUser) -> Json<UserProfile> {
    tracing::info!(clerk_id = %auth.clerk_id, "User initialized");

    Json(UserProfile {
        message: Some("User initialized successfully".to_string()),
        ..auth.user.into()
    })
}

pub async fn profile(auth: AuthUser) -> Json<UserProfile> {
    Json(auth.user.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_fields() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            clerk_id: "user_1".to_string(),
            email: "ada@example.com".to_string(),
            name: None,
            first_name: Some("Ada".to_string()),
            last_name: None,
            image_url: None,
            email_verified: true,
            last_sign_in_at: Some(now),
            banned: false,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(UserProfile::from(user)).unwrap();
        assert_eq!(json["clerk_id"], "user_1");
        assert!(json["name"].is_null());
        assert!(json.get("last_sign_in").is_some());
        assert!(json.get("banned").is_none());
        assert!(json.get("message").is_none());
    }
}
