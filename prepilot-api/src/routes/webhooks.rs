/// Clerk webhook receiver
///
/// # Endpoint
///
/// ```text
/// POST /v1/webhooks/clerk
/// svix-id: msg_...
/// svix-timestamp: 1700000000
/// svix-signature: v1,<base64>
/// ```
///
/// The raw body is verified before it is parsed. Successful deliveries are
/// acknowledged with a plain `{"message": ...}` object; any 5xx makes the
/// provider retry.
///
/// # Errors
///
/// - `401`: signature, timestamp or headers invalid
/// - `400`: body is not an event envelope, or the payload is unusable
/// - `404`: `user.updated` for a user we never stored
/// - `500`: the store rejected the change

use crate::{app::AppState, error::ApiError, error::ApiResult};
use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use prepilot_shared::models::user::User;
use prepilot_shared::webhooks::events::{ClerkUser, DeletedUser};
use prepilot_shared::webhooks::signature::{HEADER_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use prepilot_shared::webhooks::{WebhookEnvelope, WebhookEvent, WebhookHeaders};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let svix = WebhookHeaders {
        id: header(&headers, HEADER_ID),
        timestamp: header(&headers, HEADER_TIMESTAMP),
        signature: header(&headers, HEADER_SIGNATURE),
    };
    state.webhooks.verify(&svix, &body)?;

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON payload".to_string()))?;

    info!(
        event_type = %envelope.event_type,
        message_id = svix.id.unwrap_or("-"),
        "Received Clerk webhook"
    );

    match WebhookEvent::from_envelope(envelope)? {
        WebhookEvent::UserCreated(user) => user_created(&state.db, user).await,
        WebhookEvent::UserUpdated(user) => user_updated(&state.db, user).await,
        WebhookEvent::UserDeleted(user) => user_deleted(&state.db, user).await,
        WebhookEvent::SessionCreated { user_id } => Ok(session_created(&state.db, &user_id).await),
        WebhookEvent::Unhandled(event_type) => {
            debug!(event_type = %event_type, "Ignoring webhook event");
            Ok(Json(json!({
                "message": format!("Event type {} received but not handled", event_type)
            })))
        }
    }
}

fn no_email() -> ApiError {
    ApiError::BadRequest("User has no email address".to_string())
}

async fn user_created(db: &PgPool, user: ClerkUser) -> ApiResult<Json<Value>> {
    let row = user.to_upsert().ok_or_else(no_email)?;

    let stored = User::upsert_by_clerk_id(db, row)
        .await
        .map_err(|e| ApiError::failed("Failed to save user", e))?;

    info!(clerk_id = %stored.clerk_id, user_id = %stored.id, "User synced from webhook");

    Ok(Json(json!({
        "message": "User created successfully",
        "user_id": stored.id,
        "clerk_id": stored.clerk_id,
    })))
}

async fn user_updated(db: &PgPool, user: ClerkUser) -> ApiResult<Json<Value>> {
    let update = user.to_update().ok_or_else(no_email)?;
    let failed = |e: sqlx::Error| ApiError::failed("Failed to update user", e);

    let mut tx = db.begin().await.map_err(failed)?;

    let updated = User::update_by_clerk_id(&mut *tx, &user.id, update)
        .await
        .map_err(failed)?;
    if updated.is_none() {
        warn!(clerk_id = %user.id, "Update for unknown user");
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    User::set_banned(&mut *tx, &user.id, user.banned)
        .await
        .map_err(failed)?;

    tx.commit().await.map_err(failed)?;

    info!(clerk_id = %user.id, banned = user.banned, "User updated from webhook");

    Ok(Json(json!({ "message": "User updated successfully" })))
}

async fn user_deleted(db: &PgPool, user: DeletedUser) -> ApiResult<Json<Value>> {
    let deleted = User::delete_by_clerk_id(db, &user.id)
        .await
        .map_err(|e| ApiError::failed("Failed to delete user", e))?;

    if deleted {
        info!(clerk_id = %user.id, "User deleted from webhook");
    } else {
        debug!(clerk_id = %user.id, "Deleted user was not stored locally");
    }

    Ok(Json(json!({ "message": "User deleted successfully" })))
}

/// Records the sign-in; failures are logged and still acknowledged
async fn session_created(db: &PgPool, clerk_id: &str) -> Json<Value> {
    match User::touch_last_sign_in(db, clerk_id).await {
        Ok(true) => debug!(clerk_id, "Recorded sign-in"),
        Ok(false) => warn!(clerk_id, "Session created for unknown user"),
        Err(e) => error!(clerk_id, error = %e, "Failed to record sign-in"),
    }

    Json(json!({ "message": "Session created successfully" }))
}
