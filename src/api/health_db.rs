use axum::{extract::Extension, http::StatusCode};
use std::sync::Arc;
use tracing::warn;

use crate::app_state::models::AppState;

pub async fn health_db(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<StatusCode, StatusCode> {
    // Check PostgreSQL connection
    let pg_ok = app_state
        .postgres_service
        .repository_health_check
        .check()
        .await
        .is_ok();

    // Check Redis connection
    let redis_ok = app_state.quote_cache.ping().await.is_ok();

    if pg_ok && redis_ok {
        Ok(StatusCode::OK)
    } else {
        warn!(postgres = pg_ok, redis = redis_ok, "Health check failed");
        Err(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
