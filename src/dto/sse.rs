use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::common::{LeaderboardEntry, QuestionSnapshot};
use crate::dto::quiz::{EventSummary, WinnerSummary};

#[derive(Clone, Debug)]
/// Dispatched payload carried across room broadcast channels. The same shape
/// feeds both the SSE streams and the WebSocket room forwarders.
pub struct ServerEvent {
    /// Event name on the wire, `None` for unnamed messages.
    pub event: Option<String>,
    /// JSON-serialised payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the stream (`upcoming` or an event room key).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// Degraded flag.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast to the upcoming feed and the event room when an event goes live.
pub struct EventStartedEvent {
    /// The event that just started.
    pub event: EventSummary,
    /// Theme of the day.
    pub theme: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a question opens for answers.
pub struct QuestionStartedEvent {
    /// Date key of the owning quiz.
    pub quiz_id: String,
    /// Event identifier.
    pub event_id: Uuid,
    /// The question, answer withheld.
    pub question: QuestionSnapshot,
    /// How many questions the event runs in total.
    pub total_questions: usize,
    /// Server epoch-ms at which the answer window opened.
    pub started_at_ms: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a question closes, revealing the answer.
pub struct QuestionEndedEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Position of the question that ended.
    pub question_index: usize,
    /// The correct answer, now public.
    pub correct_answer: String,
    /// Explanation of the answer.
    pub explanation: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after each question with the refreshed standings.
pub struct LeaderboardUpdateEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Ranked rows, best first.
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when an event completes.
pub struct EventEndedEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Winner, absent when nobody scored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<WinnerSummary>,
    /// Final standings.
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast to an event room when a participant joins.
pub struct ParticipantJoinedEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// User identifier.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Participants now in the room.
    pub participant_count: usize,
}
