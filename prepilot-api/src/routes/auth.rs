/// Password registration (deprecated)
///
/// Accounts are created through the identity provider and mirrored here by
/// the Clerk webhook. The endpoint stays routed so old clients get a clear
/// error instead of a 404.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// ```

use crate::error::ApiError;

pub const REGISTER_DEPRECATED: &str =
    "Registration is handled by the identity provider; sign up through the client application";

/// Always fails with 400
pub async fn register() -> ApiError {
    ApiError::BadRequest(REGISTER_DEPRECATED.to_string())
}
