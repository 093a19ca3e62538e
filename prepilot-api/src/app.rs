/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use prepilot_api::{app::AppState, config::Config};
/// use prepilot_shared::db::pool::create_pool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(config.database.clone()).await?;
/// let state = AppState::from_config(pool, config)?;
/// let app = prepilot_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::{Config, TokenKeySource},
    error::{ApiError, INTERNAL_ERROR_MESSAGE},
    middleware::auth::require_auth,
};
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, Request},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use prepilot_shared::auth::{ClerkJwtVerifier, IdentityVerifier};
use prepilot_shared::webhooks::WebhookVerifier;
use sqlx::PgPool;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Requests running longer than this get a 408
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Session token verifier
    pub identity: Arc<dyn IdentityVerifier>,

    /// Svix signature verifier for inbound webhooks
    pub webhooks: Arc<WebhookVerifier>,
}

impl AppState {
    /// Creates application state around an existing identity verifier
    ///
    /// Unsigned webhooks are accepted only when no secret is configured and
    /// the environment is `development`.
    pub fn new(db: PgPool, config: Config, identity: Arc<dyn IdentityVerifier>) -> Self {
        let webhooks = WebhookVerifier::new(
            &config.clerk.webhook_secret,
            config.server.is_development(),
        );

        Self {
            db,
            config: Arc::new(config),
            identity,
            webhooks: Arc::new(webhooks),
        }
    }

    /// Creates application state, building the token verifier from config
    ///
    /// # Errors
    ///
    /// Returns an error if the configured PEM key cannot be parsed or the
    /// HTTP client for the JWKS endpoint cannot be built.
    pub fn from_config(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let parties = config.clerk.authorized_parties.clone();

        let identity: Arc<dyn IdentityVerifier> = match &config.clerk.token_keys {
            TokenKeySource::Pem(pem) => Arc::new(ClerkJwtVerifier::from_pem(pem, parties)?),
            TokenKeySource::Jwks { url, secret_key } => {
                Arc::new(ClerkJwtVerifier::from_jwks_url(url, secret_key.clone(), parties)?)
            }
        };

        Ok(Self::new(db, config, identity))
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /v1
/// ├── GET  /health
/// ├── POST /webhooks/clerk              # Svix-signed, no bearer auth
/// ├── POST /auth/register               # deprecated, always 400
/// └── (bearer auth)
///     ├── POST /user/initialize
///     ├── GET  /user/profile
///     ├── POST|GET /study-plans
///     ├── GET|PUT|DELETE /study-plans/:id
///     ├── GET  /study-plans/:id/tasks
///     ├── POST|GET /study-tasks
///     ├── GET  /study-tasks/overdue
///     ├── GET|PUT|DELETE /study-tasks/:id
///     └── PATCH /study-tasks/:id/status
/// ```
///
/// # Middleware Stack
///
/// Outermost first: panic recovery, request id, tracing, CORS, timeout,
/// body limit, then authentication on the protected routes.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Public routes
    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/webhooks/clerk", post(routes::webhooks::clerk_webhook))
        .route("/auth/register", post(routes::auth::register));

    // Protected routes (bearer token + lazy user provisioning)
    let protected_routes = Router::new()
        .route("/user/initialize", post(routes::user::initialize))
        .route("/user/profile", get(routes::user::profile))
        .route(
            "/study-plans",
            post(routes::study_plans::create_study_plan).get(routes::study_plans::list_study_plans),
        )
        .route(
            "/study-plans/:id",
            get(routes::study_plans::get_study_plan)
                .put(routes::study_plans::update_study_plan)
                .delete(routes::study_plans::delete_study_plan),
        )
        .route("/study-plans/:id/tasks", get(routes::study_plans::list_plan_tasks))
        .route(
            "/study-tasks",
            post(routes::study_tasks::create_study_task).get(routes::study_tasks::list_study_tasks),
        )
        .route("/study-tasks/overdue", get(routes::study_tasks::list_overdue_tasks))
        .route(
            "/study-tasks/:id",
            get(routes::study_tasks::get_study_task)
                .put(routes::study_tasks::update_study_task)
                .delete(routes::study_tasks::delete_study_task),
        )
        .route("/study-tasks/:id/status", patch(routes::study_tasks::update_task_status))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    let v1_routes = Router::new().merge(public_routes).merge(protected_routes);

    let cors = cors_layer(&state.config.server.client_origin);

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1", v1_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(trace)
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn cors_layer(client_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([header::LINK])
        .max_age(Duration::from_secs(300));

    match HeaderValue::from_str(client_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(client_origin, "CLIENT_ORIGIN is not a valid header value; cross-origin requests disabled");
            layer
        }
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    ApiError::InternalError(format!("Handler panicked: {}", detail)).into_response()
}
