/// Middleware modules for the API server
///
/// - `auth`: bearer-token verification, user provisioning and the
///   `AuthUser` extractor

pub mod auth;
