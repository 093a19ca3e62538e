/// Database models for PrePilot
///
/// Each model owns its SQL. Methods take a pool (or any executor, where a
/// caller needs to group writes in a transaction) and return `sqlx::Error`.
///
/// # Models
///
/// - `user`: Users mirrored from the identity provider
/// - `study_plan`: Exam study plans
/// - `study_task`: Tasks, optionally attached to a plan

pub mod study_plan;
pub mod study_task;
pub mod user;
