use std::{
    collections::HashSet,
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use dashmap::DashMap;
use tokio::{sync::Mutex, task::JoinHandle};
use uuid::Uuid;

use crate::{
    dao::models::QuestionEntity,
    state::state_machine::{EventPhase, EventStateMachine},
};

/// Identifies one live session: the owning quiz date plus the event ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Date key of the daily quiz (`YYYY-MM-DD`).
    pub quiz_id: String,
    /// Event primary key.
    pub event_id: Uuid,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.quiz_id, self.event_id)
    }
}

/// Milliseconds since the Unix epoch for `now`, the timestamp base shared with
/// clients for latency scoring.
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Runtime state driving one active event's question-by-question progression.
/// Never persisted; rebuilt from the event document after a restart.
pub struct LiveSession {
    /// Session identity.
    pub key: SessionKey,
    /// Theme of the owning daily quiz, echoed in broadcasts.
    pub theme: String,
    /// Snapshot of the day's questions, correct answers included.
    pub questions: Vec<QuestionEntity>,
    /// Versioned lifecycle machine; every transition goes through it.
    pub machine: EventStateMachine,
    /// Epoch-ms timestamp of the current question's start.
    pub question_started_at_ms: Option<u64>,
    /// User IDs that already answered the current question.
    pub answered: HashSet<String>,
    /// User IDs currently joined to the room; drives early termination.
    pub present: HashSet<String>,
    /// Pending question timeout, cancelled when the question ends early.
    pub question_timer: Option<JoinHandle<()>>,
    /// Pending delayed begin-next-question task.
    pub advance_timer: Option<JoinHandle<()>>,
    /// Pending absolute end-of-event timer.
    pub end_timer: Option<JoinHandle<()>>,
}

impl LiveSession {
    /// Session for an event that is about to go live.
    pub fn new(key: SessionKey, theme: String, questions: Vec<QuestionEntity>) -> Self {
        Self {
            key,
            theme,
            questions,
            machine: EventStateMachine::new(),
            question_started_at_ms: None,
            answered: HashSet::new(),
            present: HashSet::new(),
            question_timer: None,
            advance_timer: None,
            end_timer: None,
        }
    }

    /// Session rebuilt from persisted state after a restart.
    pub fn resumed(
        key: SessionKey,
        theme: String,
        questions: Vec<QuestionEntity>,
        phase: EventPhase,
    ) -> Self {
        let mut session = Self::new(key, theme, questions);
        session.machine = EventStateMachine::resumed(phase);
        session
    }

    /// Question currently showing, if any.
    pub fn current_question(&self) -> Option<(usize, &QuestionEntity)> {
        let index = self.machine.showing_index()?;
        self.questions.get(index).map(|question| (index, question))
    }

    /// Milliseconds elapsed since the current question started.
    pub fn elapsed_ms(&self, now_ms: u64) -> Option<u64> {
        self.question_started_at_ms
            .map(|started| now_ms.saturating_sub(started))
    }

    /// True when everyone currently present has answered the showing question.
    pub fn all_present_answered(&self) -> bool {
        !self.present.is_empty()
            && self
                .present
                .iter()
                .all(|user_id| self.answered.contains(user_id))
    }

    /// Cancel the pending question timeout, if armed.
    pub fn abort_question_timer(&mut self) {
        if let Some(handle) = self.question_timer.take() {
            handle.abort();
        }
    }

    /// Cancel every pending timer. Called before the session is discarded so
    /// no dangling callback can touch stale state.
    pub fn abort_all_timers(&mut self) {
        self.abort_question_timer();
        if let Some(handle) = self.advance_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.end_timer.take() {
            handle.abort();
        }
    }
}

/// Coordinator-owned registry of active sessions. All access goes through the
/// per-session mutex, which is the explicit lock a multi-threaded runtime
/// needs where the original relied on event-loop serialization.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Mutex<LiveSession>>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session, replacing any previous one under the same key.
    pub fn insert(&self, session: LiveSession) -> Arc<Mutex<LiveSession>> {
        let key = session.key.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(key, handle.clone());
        handle
    }

    /// Look up a session by key.
    pub fn get(&self, key: &SessionKey) -> Option<Arc<Mutex<LiveSession>>> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Remove a session, returning the handle so timers can be cancelled.
    pub fn remove(&self, key: &SessionKey) -> Option<Arc<Mutex<LiveSession>>> {
        self.sessions.remove(key).map(|(_, handle)| handle)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is currently active.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey {
            quiz_id: "2026-08-30".into(),
            event_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn all_present_answered_requires_presence() {
        let mut session = LiveSession::new(key(), "History".into(), Vec::new());
        // Nobody present: never terminate early on an empty room.
        assert!(!session.all_present_answered());

        session.present.insert("u1".into());
        session.present.insert("u2".into());
        session.answered.insert("u1".into());
        assert!(!session.all_present_answered());

        session.answered.insert("u2".into());
        assert!(session.all_present_answered());
    }

    #[test]
    fn elapsed_ms_saturates_on_clock_skew() {
        let mut session = LiveSession::new(key(), "History".into(), Vec::new());
        session.question_started_at_ms = Some(10_000);
        assert_eq!(session.elapsed_ms(10_500), Some(500));
        // A client timestamp before the question start clamps to zero.
        assert_eq!(session.elapsed_ms(9_000), Some(0));
    }

    #[test]
    fn registry_insert_get_remove() {
        let registry = SessionRegistry::new();
        let key = key();
        registry.insert(LiveSession::new(key.clone(), "Sports".into(), Vec::new()));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&key).is_some());
        assert!(registry.remove(&key).is_some());
        assert!(registry.is_empty());
    }
}
