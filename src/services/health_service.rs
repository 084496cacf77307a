use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe storage and report service health along with the number of event
/// sessions this process is currently driving.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let live_sessions = state.sessions().len();

    let storage_ok = match state.require_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "storage ping failed during health check");
                false
            }
        },
        Err(_) => {
            warn!("health check while storage is unavailable");
            false
        }
    };

    if storage_ok && !state.is_degraded() {
        HealthResponse::ok(live_sessions)
    } else {
        HealthResponse::degraded(live_sessions)
    }
}
