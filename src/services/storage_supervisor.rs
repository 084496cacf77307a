//! Keeps the MongoDB connection alive and drives the shared degraded flag.
//!
//! The scheduler blocks on the degraded flag, so the supervisor flipping it
//! back to healthy is what lets quiz events start.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{quiz_store::QuizStore, storage::StorageError},
    services::room_events::broadcast_system_status,
    state::SharedState,
};

const BACKOFF_FLOOR: Duration = Duration::from_millis(1_000);
const BACKOFF_CEILING: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(BACKOFF_CEILING)
}

/// Connect to storage, then poll its health forever. Every transition of the
/// degraded flag is mirrored to connected clients as a `system.status` event.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn QuizStore>, StorageError>> + Send,
{
    let mut backoff = BACKOFF_FLOOR;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "could not reach storage, retrying");
                sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };

        state.install_store(store.clone()).await;
        info!("storage connected, service is live");
        broadcast_system_status(&state, false);
        backoff = BACKOFF_FLOOR;

        supervise(&state, store.as_ref()).await;

        // Reconnect attempts were exhausted. Drop the stale handle so request
        // paths fail fast, then fall back to the outer connect loop.
        state.clear_store().await;
        sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

/// Poll health until the store is lost for good. Returns once reconnection
/// has been given up on, with the state left in degraded mode.
async fn supervise(state: &SharedState, store: &dyn QuizStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded() {
                info!("storage healthy again, leaving degraded mode");
                state.update_degraded(false);
                broadcast_system_status(state, false);
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect_with_retries(state, store).await {
            warn!("giving up on storage reconnection, staying degraded");
            return;
        }

        state.update_degraded(false);
        broadcast_system_status(state, false);
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Up to [`MAX_RECONNECT_ATTEMPTS`] reconnects with exponential backoff.
/// The first failed attempt flips the service into degraded mode.
async fn reconnect_with_retries(state: &SharedState, store: &dyn QuizStore) -> bool {
    let mut pause = BACKOFF_FLOOR;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnected after failed health check");
                return true;
            }
            Err(err) if attempt == 0 => {
                warn!(error = %err, "storage health check failed, entering degraded mode");
                state.update_degraded(true);
                broadcast_system_status(state, true);
            }
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
            }
        }
        sleep(pause).await;
        pause = next_backoff(pause);
    }

    false
}
