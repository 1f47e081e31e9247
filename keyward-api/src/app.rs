/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use keyward_api::{app::{build_router, AppState}, config::Config};
/// use keyward_shared::clock::SystemClock;
/// use keyward_shared::db::pool::create_pool;
/// use keyward_shared::session::manager::SessionManager;
/// use keyward_shared::store::{PgAccountStore, PgSessionStore};
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(config.database.clone()).await?;
/// let sessions = SessionManager::new(
///     Arc::new(PgAccountStore::new(pool.clone())),
///     Arc::new(PgSessionStore::new(pool.clone())),
///     &config.auth,
///     Arc::new(SystemClock),
/// );
/// let app = build_router(AppState::new(Arc::new(sessions), config, Some(pool)));
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use keyward_shared::auth::middleware::access_token_auth;
use keyward_shared::session::manager::SessionManager;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned per request by Axum's `State` extractor; everything inside is
/// reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle
    pub sessions: Arc<SessionManager>,

    /// Application configuration
    pub config: Arc<Config>,

    /// Database pool, absent when running on in-memory stores
    pub db: Option<PgPool>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, config: Config, db: Option<PgPool>) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
            db,
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /
/// ├── GET  /health
/// └── /v1/auth/
///     ├── POST /login
///     ├── POST /refresh
///     ├── POST /logout        # refresh token and/or bearer
///     ├── POST /logout-all    # bearer
///     ├── GET  /sessions      # bearer
///     └── GET  /me            # bearer
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_auth_routes = Router::new()
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/logout", post(routes::auth::logout));

    let bearer_auth_routes = Router::new()
        .route("/logout-all", post(routes::auth::logout_all))
        .route("/sessions", get(routes::auth::list_sessions))
        .route("/me", get(routes::auth::me))
        .layer(axum::middleware::from_fn_with_state(
            state.sessions.clone(),
            access_token_auth,
        ));

    let v1_routes = Router::new().nest("/auth", public_auth_routes.merge(bearer_auth_routes));

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|origin| origin == "*") {
        // Development mode: permissive CORS
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
