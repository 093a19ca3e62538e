/// Database layer for PrePilot
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: Versioned SQL migrations with an up/down ledger
///
/// Models are in the `models` module at crate root level.

pub mod migrations;
pub mod pool;
