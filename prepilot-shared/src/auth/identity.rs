/// Caller identity resolution
///
/// An [`IdentityVerifier`] turns a bearer token into the caller's
/// identity-provider ID and email. The API server holds one behind an
/// `Arc<dyn IdentityVerifier>` so tests can substitute their own.
///
/// # Example
///
/// ```
/// use prepilot_shared::auth::identity::parse_bearer;
///
/// assert_eq!(parse_bearer("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
/// assert!(parse_bearer("Basic dXNlcjpwYXNz").is_err());
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Who is calling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity-provider user ID (`user_...`)
    pub clerk_id: String,

    /// Email claim, when the token carries one
    pub email: Option<String>,
}

/// Error type for identity resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// No Authorization header
    #[error("Authorization header required")]
    MissingCredentials,

    /// Header present but not `Bearer <token>`
    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// `azp` claim not in the allow-list
    #[error("Token issued for unauthorized party")]
    UnauthorizedParty,

    /// No configured key matches the token's `kid`
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// Signing keys could not be loaded
    #[error("Failed to load signing keys: {0}")]
    KeySource(String),
}

impl IdentityError {
    /// Whether the failure is on our side rather than the caller's
    pub fn is_server_error(&self) -> bool {
        matches!(self, IdentityError::KeySource(_))
    }
}

/// Resolves a bearer token to an identity
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// Extracts the token from an `Authorization` header value
///
/// The scheme is matched case-insensitively. Surrounding whitespace around
/// the token is ignored; an empty token is rejected.
pub fn parse_bearer(header: &str) -> Result<&str, IdentityError> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(IdentityError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(IdentityError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(IdentityError::InvalidFormat);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer token123"), Ok("token123"));
        assert_eq!(parse_bearer("bearer token123"), Ok("token123"));
        assert_eq!(parse_bearer("BEARER   token123  "), Ok("token123"));
    }

    #[test]
    fn test_parse_bearer_rejects_malformed() {
        assert_eq!(parse_bearer("token123"), Err(IdentityError::InvalidFormat));
        assert_eq!(parse_bearer("Bearer "), Err(IdentityError::InvalidFormat));
        assert_eq!(parse_bearer("Bearer"), Err(IdentityError::InvalidFormat));
        assert_eq!(parse_bearer("Token token123"), Err(IdentityError::InvalidFormat));
        assert_eq!(parse_bearer(""), Err(IdentityError::InvalidFormat));
    }

    #[test]
    fn test_server_side_errors() {
        assert!(IdentityError::KeySource("timeout".into()).is_server_error());
        assert!(!IdentityError::Expired.is_server_error());
        assert!(!IdentityError::UnknownKey("kid".into()).is_server_error());
    }
}
