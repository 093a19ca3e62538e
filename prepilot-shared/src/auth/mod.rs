/// Authentication utilities
///
/// # Modules
///
/// - [`identity`]: the `IdentityVerifier` seam, identity types and bearer parsing
/// - [`jwt`]: Clerk session token verification (PEM or JWKS)
///
/// # Example
///
/// ```no_run
/// use prepilot_shared::auth::identity::{parse_bearer, IdentityVerifier};
/// use prepilot_shared::auth::jwt::ClerkJwtVerifier;
///
/// # async fn example(header: &str, pem: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let verifier = ClerkJwtVerifier::from_pem(pem, Vec::new())?;
/// let identity = verifier.verify(parse_bearer(header)?).await?;
/// # Ok(())
/// # }
/// ```

pub mod identity;
pub mod jwt;

pub use identity::{Identity, IdentityError, IdentityVerifier};
pub use jwt::ClerkJwtVerifier;
