/// Health check endpoint
///
/// Provides a simple health check endpoint that verifies:
/// - The server is running
/// - Database connectivity
///
/// # Endpoint
///
/// ```text
/// GET /v1/health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "data": {
///     "status": "OK",
///     "env": "development",
///     "version": "0.1.0",
///     "database": "connected"
///   }
/// }
/// ```

use crate::{app::AppState, extract::Data};
use axum::extract::State;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `OK`, or `degraded` when the database does not answer
    pub status: String,

    /// Deployment environment
    pub env: String,

    /// Application version
    pub version: String,

    /// Database status
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> Data<HealthResponse> {
    let connected = prepilot_shared::db::pool::health_check(&state.db).await.is_ok();

    Data {
        data: HealthResponse {
            status: if connected { "OK" } else { "degraded" }.to_string(),
            env: state.config.server.env.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if connected { "connected" } else { "disconnected" }.to_string(),
        },
    }
}
