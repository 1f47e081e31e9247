/// Health check endpoint
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "pool": { "active_connections": 1, "idle_connections": 1, "total_connections": 2 }
/// }
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use keyward_shared::db::pool::{get_pool_stats, health_check as ping, PoolStats};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Database status
    pub database: String,

    /// Pool occupancy, when a database is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
}

/// Health check handler
///
/// A missing pool (in-memory stores) still reports healthy.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let (database, pool) = match &state.db {
        Some(db) => match ping(db).await {
            Ok(()) => ("connected", Some(get_pool_stats(db))),
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                ("disconnected", None)
            }
        },
        None => ("not_configured", None),
    };

    Ok(Json(HealthResponse {
        status: if database == "disconnected" {
            "degraded".to_string()
        } else {
            "healthy".to_string()
        },
        version: keyward_shared::VERSION.to_string(),
        database: database.to_string(),
        pool,
    }))
}
