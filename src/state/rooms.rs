use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::{dto::sse::ServerEvent, state::session::SessionKey};

/// Broadcast hub for one event room (or the shared upcoming-events feed).
#[derive(Clone)]
pub struct RoomHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl RoomHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

/// Registry of per-event rooms plus the upcoming-events hub. Rooms are created
/// lazily on first subscription or broadcast and dropped when their event ends.
pub struct RoomRegistry {
    rooms: DashMap<SessionKey, RoomHub>,
    upcoming: RoomHub,
    capacity: usize,
}

impl RoomRegistry {
    /// Build the registry with a per-room channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            upcoming: RoomHub::new(capacity),
            capacity,
        }
    }

    /// Hub for one event's room, created on demand.
    pub fn room(&self, key: &SessionKey) -> RoomHub {
        self.rooms
            .entry(key.clone())
            .or_insert_with(|| RoomHub::new(self.capacity))
            .clone()
    }

    /// Drop a room once its event has completed.
    pub fn remove(&self, key: &SessionKey) {
        self.rooms.remove(key);
    }

    /// Hub carrying announcements about upcoming and starting events.
    pub fn upcoming(&self) -> &RoomHub {
        &self.upcoming
    }
}
