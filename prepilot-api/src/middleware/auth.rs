/// Bearer-token authentication
///
/// [`require_auth`] runs on every protected route. It verifies the session
/// token, makes sure a local user row exists for the caller, and stores an
/// [`AuthUser`] in the request extensions. Handlers take `AuthUser` as a
/// parameter to get at the caller.
///
/// # Example
///
/// ```no_run
/// use prepilot_api::middleware::auth::AuthUser;
///
/// async fn whoami(user: AuthUser) -> String {
///     user.clerk_id
/// }
/// ```

use crate::{app::AppState, error::ApiError};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use prepilot_shared::auth::identity::{parse_bearer, Identity, IdentityError};
use prepilot_shared::models::user::User;
use sqlx::PgPool;

/// Domain used for emails synthesized when the token carries none
pub const PLACEHOLDER_EMAIL_DOMAIN: &str = "users.prepilot.invalid";

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Identity-provider user ID; owner key for plans and tasks
    pub clerk_id: String,

    /// The caller's local row, as of this request
    pub user: User,
}

pub fn placeholder_email(clerk_id: &str) -> String {
    format!("{}@{}", clerk_id, PLACEHOLDER_EMAIL_DOMAIN)
}

/// Authentication middleware layer
///
/// Rejects with 401 when the header is missing or the token does not
/// verify, and with 500 when the user row cannot be provisioned. The
/// downstream handler is not called in either case.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(IdentityError::MissingCredentials)?
        .to_str()
        .map_err(|_| IdentityError::InvalidFormat)?;

    let token = parse_bearer(value)?.to_string();
    let identity = state.identity.verify(&token).await?;

    let user = provision_user(&state.db, &identity).await.map_err(|e| {
        ApiError::failed("Failed to process user authentication", e)
    })?;

    tracing::debug!(clerk_id = %identity.clerk_id, "Authenticated request");

    req.extensions_mut().insert(AuthUser {
        clerk_id: identity.clerk_id,
        user,
    });

    Ok(next.run(req).await)
}

/// Returns the caller's row, creating a minimal one on first sight
///
/// Users normally arrive through the `user.created` webhook; this covers
/// requests that beat the webhook. If the token's email already belongs to
/// another row, a placeholder address is used instead.
pub async fn provision_user(pool: &PgPool, identity: &Identity) -> Result<User, sqlx::Error> {
    if let Some(user) = User::find_by_clerk_id(pool, &identity.clerk_id).await? {
        return Ok(user);
    }

    let placeholder = placeholder_email(&identity.clerk_id);
    let email = identity.email.clone().unwrap_or_else(|| placeholder.clone());

    tracing::info!(clerk_id = %identity.clerk_id, "Provisioning user on first request");

    match User::ensure_exists(pool, &identity.clerk_id, &email).await {
        Err(sqlx::Error::RowNotFound) if email != placeholder => {
            tracing::warn!(clerk_id = %identity.clerk_id, "Token email already in use, using placeholder");
            User::ensure_exists(pool, &identity.clerk_id, &placeholder).await
        }
        result => result,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
    }
}
