/// Broadcast rooms for event fan-out.
pub mod rooms;
/// In-memory live session state and its registry.
pub mod session;
/// Per-event lifecycle state machine.
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, dao::quiz_store::QuizStore, error::ServiceError};

pub use self::rooms::{RoomHub, RoomRegistry};
pub use self::session::{LiveSession, SessionKey, SessionRegistry};
pub use self::state_machine::{
    AbortError, ActivePhase, ApplyError, CompletionReason, EventPhase, EventStateMachine,
    EventTransition, InvalidTransition, Plan, PlanError, PlanId, Snapshot,
};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Per-room broadcast channel capacity.
const ROOM_CHANNEL_CAPACITY: usize = 64;

/// Central application state: storage handle, live sessions, and rooms.
pub struct AppState {
    store: RwLock<Option<Arc<dyn QuizStore>>>,
    config: Arc<AppConfig>,
    rooms: RoomRegistry,
    sessions: SessionRegistry,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            config: Arc::new(config),
            rooms: RoomRegistry::new(ROOM_CHANNEL_CAPACITY),
            sessions: SessionRegistry::new(),
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current quiz store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn QuizStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Quiz store handle, or a degraded-mode error when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn QuizStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new quiz store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn QuizStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current quiz store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag. The flag, not store presence, is authoritative:
    /// a store can be installed yet failing its health checks.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of per-event broadcast rooms.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Registry of active live sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
