//! # PrePilot API Server
//!
//! Study-planning backend: Clerk webhook sync, bearer-authenticated study
//! plan and task endpoints, PostgreSQL storage.
//!
//! ## Startup
//!
//! 1. Load configuration from the environment (and `.env`)
//! 2. Connect the database pool
//! 3. Apply pending embedded migrations
//! 4. Serve until Ctrl-C or SIGTERM, then drain in-flight requests
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p prepilot-api
//! ```

use anyhow::Context;
use prepilot_api::{
    app::{build_router, AppState},
    config::{Config, LogFormat},
};
use prepilot_shared::db::{
    migrations::{MigrationRunner, MigrationSet},
    pool::{close_pool, create_pool},
};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "prepilot_api=debug,prepilot_shared=debug,tower_http=debug";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        env = %config.server.env,
        "PrePilot API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let pool = create_pool(config.database.clone())
        .await
        .context("Failed to connect to the database")?;

    let applied = MigrationRunner::new(&pool, MigrationSet::embedded()?)
        .run()
        .await
        .context("Failed to apply database migrations")?;
    if applied.is_empty() {
        tracing::info!("Database schema is up to date");
    } else {
        tracing::info!(versions = ?applied, "Applied database migrations");
    }

    let addr = config.server.addr.clone();
    let state = AppState::from_config(pool.clone(), config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}
