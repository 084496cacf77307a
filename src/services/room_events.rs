use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{EventEntity, ParticipantEntity, WinnerEntity},
    dto::{
        common::{LeaderboardEntry, QuestionSnapshot},
        quiz::{EventSummary, WinnerSummary},
        sse::{
            EventEndedEvent, EventStartedEvent, LeaderboardUpdateEvent, ParticipantJoinedEvent,
            QuestionEndedEvent, QuestionStartedEvent, ServerEvent, SystemStatus,
        },
    },
    state::{SessionKey, SharedState},
};

const EVENT_STARTED: &str = "event-started";
const EVENT_ENDED: &str = "event-ended";
const QUESTION_STARTED: &str = "question-started";
const QUESTION_ENDED: &str = "question-ended";
const LEADERBOARD_UPDATE: &str = "leaderboard-update";
const PARTICIPANT_JOINED: &str = "participant-joined";
const SYSTEM_STATUS: &str = "system.status";

/// Broadcast a started event to both its room and the upcoming feed, so
/// subscribers waiting in the lobby learn the event went live.
pub fn broadcast_event_started(state: &SharedState, key: &SessionKey, event: &EventEntity, theme: &str) {
    let payload = EventStartedEvent {
        event: EventSummary::from(event),
        theme: theme.to_string(),
    };
    send_room_event(state, key, EVENT_STARTED, &payload);
    send_upcoming_event(state, EVENT_STARTED, &payload);
}

/// Broadcast a question opening for answers.
pub fn broadcast_question_started(
    state: &SharedState,
    key: &SessionKey,
    question: QuestionSnapshot,
    total_questions: usize,
    started_at_ms: u64,
) {
    let payload = QuestionStartedEvent {
        quiz_id: key.quiz_id.clone(),
        event_id: key.event_id,
        question,
        total_questions,
        started_at_ms,
    };
    send_room_event(state, key, QUESTION_STARTED, &payload);
}

/// Broadcast a question closing, with the answer now revealed.
pub fn broadcast_question_ended(
    state: &SharedState,
    key: &SessionKey,
    question_index: usize,
    correct_answer: &str,
    explanation: &str,
) {
    let payload = QuestionEndedEvent {
        event_id: key.event_id,
        question_index,
        correct_answer: correct_answer.to_string(),
        explanation: explanation.to_string(),
    };
    send_room_event(state, key, QUESTION_ENDED, &payload);
}

/// Broadcast refreshed standings after a question ended.
pub fn broadcast_leaderboard_update(
    state: &SharedState,
    key: &SessionKey,
    entries: Vec<LeaderboardEntry>,
) {
    let payload = LeaderboardUpdateEvent {
        event_id: key.event_id,
        entries,
    };
    send_room_event(state, key, LEADERBOARD_UPDATE, &payload);
}

/// Broadcast the end of an event with the winner and final standings.
pub fn broadcast_event_ended(
    state: &SharedState,
    key: &SessionKey,
    winner: Option<&WinnerEntity>,
    leaderboard: Vec<LeaderboardEntry>,
) {
    let payload = EventEndedEvent {
        event_id: key.event_id,
        winner: winner.map(WinnerSummary::from),
        leaderboard,
    };
    send_room_event(state, key, EVENT_ENDED, &payload);
    send_upcoming_event(state, EVENT_ENDED, &payload);
}

/// Broadcast that a participant joined an event room.
pub fn broadcast_participant_joined(
    state: &SharedState,
    key: &SessionKey,
    participant: &ParticipantEntity,
    participant_count: usize,
) {
    let payload = ParticipantJoinedEvent {
        event_id: key.event_id,
        user_id: participant.user_id.clone(),
        display_name: participant.display_name.clone(),
        participant_count,
    };
    send_room_event(state, key, PARTICIPANT_JOINED, &payload);
}

/// Broadcast a degraded-mode flip to the upcoming feed.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    let payload = SystemStatus { degraded };
    send_upcoming_event(state, SYSTEM_STATUS, &payload);
}

fn send_room_event<T: Serialize>(state: &SharedState, key: &SessionKey, name: &str, payload: &T) {
    match ServerEvent::json(name.to_string(), payload) {
        Ok(event) => state.rooms().room(key).broadcast(event),
        Err(err) => warn!(event = name, error = %err, "failed to serialize room event"),
    }
}

fn send_upcoming_event<T: Serialize>(state: &SharedState, name: &str, payload: &T) {
    match ServerEvent::json(name.to_string(), payload) {
        Ok(event) => state.rooms().upcoming().broadcast(event),
        Err(err) => warn!(event = name, error = %err, "failed to serialize upcoming event"),
    }
}

/// Shorthand used by tests and services that only have an event at hand.
pub fn session_key(quiz_id: &str, event_id: Uuid) -> SessionKey {
    SessionKey {
        quiz_id: quiz_id.to_string(),
        event_id,
    }
}
