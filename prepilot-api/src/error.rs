/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `ApiResult<T>`; the error side always renders as
/// `{"error": "<message>"}` with the matching status code.
///
/// # Example
///
/// ```
/// use prepilot_api::error::{ApiError, ApiResult};
///
/// fn find(found: bool) -> ApiResult<&'static str> {
///     if !found {
///         return Err(ApiError::NotFound("Study plan not found".to_string()));
///     }
///     Ok("plan")
/// }
///
/// assert!(find(false).is_err());
/// ```

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use prepilot_shared::auth::IdentityError;
use prepilot_shared::webhooks::{EventError, WebhookError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message returned with every 500; details only go to the log
pub const INTERNAL_ERROR_MESSAGE: &str = "The server encountered a problem while processing your request";

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409), e.g. duplicate email
    Conflict(String),

    /// Internal server error (500)
    ///
    /// The message is logged, never sent to the client.
    InternalError(String),

    /// Internal server error (500) with a fixed client-facing message
    ///
    /// The second field is the underlying cause and is only logged.
    Failed(&'static str, String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Failed(msg, cause) => write!(f, "{}: {}", msg, cause),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) | ApiError::Failed(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A 500 whose client message is `message`
    pub fn failed(message: &'static str, cause: impl fmt::Display) -> Self {
        ApiError::Failed(message, cause.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match self {
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                INTERNAL_ERROR_MESSAGE.to_string()
            }
            ApiError::Failed(msg, cause) => {
                tracing::error!(error = %cause, "{}", msg);
                msg.to_string()
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => {
                tracing::debug!(status = status.as_u16(), "{}", msg);
                msg
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return ApiError::Conflict("A record with the same unique value already exists".to_string());
                }
                if db_err.is_foreign_key_violation() {
                    return ApiError::BadRequest("Referenced resource does not exist".to_string());
                }

                // Other database errors are internal
                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Malformed, oversized or wrongly typed JSON bodies
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                let field = field.to_string();
                errors.iter().map(move |error| {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field));
                    if field == "__all__" {
                        message
                    } else {
                        format!("{}: {}", field, message)
                    }
                })
            })
            .collect();
        messages.sort();

        ApiError::BadRequest(messages.join("; "))
    }
}

/// Convert identity errors to API errors
///
/// Every verification failure is a 401. Key-loading failures are logged at
/// error level.
impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        if err.is_server_error() {
            tracing::error!(error = %err, "Session token keys unavailable");
        } else {
            tracing::debug!(error = %err, "Session token rejected");
        }

        match &err {
            IdentityError::MissingCredentials | IdentityError::InvalidFormat => {
                ApiError::Unauthorized(err.to_string())
            }
            _ => ApiError::Unauthorized("Invalid token format".to_string()),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        tracing::warn!(reason = %err, "Rejected webhook delivery");
        ApiError::Unauthorized("Invalid webhook signature".to_string())
    }
}

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
