/// Health check endpoint
///
/// ```text
/// GET /api/health
/// ```
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "rate_limiter": "redis",
///   "pool": { "active_connections": 1, "idle_connections": 1, "total_connections": 2 }
/// }
/// ```
///
/// Always answers 200; a failing database shows up as `"degraded"`.

use crate::app::AppState;
use axum::{extract::State, Json};
use nexusflow_shared::db::pool;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,

    /// `redis` when buckets are shared between instances, `local` otherwise
    pub rate_limiter: String,

    pub pool: pool::PoolStats,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = match pool::health_check(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: nexusflow_shared::VERSION.to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
        rate_limiter: if state.limiter.is_shared() { "redis" } else { "local" }.to_string(),
        pool: pool::get_pool_stats(&state.db),
    })
}
