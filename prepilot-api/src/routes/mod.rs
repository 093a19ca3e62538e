/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `webhooks`: Clerk webhook receiver
/// - `auth`: Deprecated password registration
/// - `user`: Current user profile
/// - `study_plans`: Study plan CRUD
/// - `study_tasks`: Study task CRUD

pub mod auth;
pub mod health;
pub mod study_plans;
pub mod study_tasks;
pub mod user;
pub mod webhooks;
