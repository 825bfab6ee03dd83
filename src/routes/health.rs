use axum::{extract::State, Json};
use chrono::Utc;
use tracing::warn;

use crate::{models::chat::HealthCheck, state::AppState};

/// Liveness and dependency probe. Always answers 200 so load balancers
/// can distinguish "process up, database down" from "process gone"; the
/// body carries the dependency detail.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheck> {
    let database = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            false
        }
    };

    // The sliding-window gate is in-process, so there is no external
    // rate-limit store to probe.
    let redis = true;

    let status = if database && redis {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthCheck {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: state.config.app_version.clone(),
        database,
        redis,
    })
}
