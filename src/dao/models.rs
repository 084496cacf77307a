use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Subscription tier attached to a user account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// Default tier.
    Free,
    /// Paid tier.
    Premium,
    /// Discounted tier for schools.
    Education,
}

/// Persisted lifecycle status of a live event. Only ever moves forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Waiting for its start time.
    Scheduled,
    /// Currently running.
    Active,
    /// Finished; winner and scores frozen.
    Completed,
}

/// One scored answer of a participant for a single question position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecordEntity {
    /// Whether the submitted text matched the correct answer exactly.
    pub correct: bool,
    /// Latency between question start and submission, in milliseconds.
    pub response_ms: u64,
    /// Points awarded for this answer.
    pub points: u32,
}

/// A user who joined or answered within an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// User directory identifier.
    pub user_id: String,
    /// Display name resolved when the participant first appeared.
    pub display_name: String,
    /// When the participant first joined the event.
    pub joined_at: SystemTime,
    /// Cumulative score across all answered questions.
    pub score: u32,
    /// Number of correctly answered questions.
    pub correct_answers: u32,
    /// Per-question records, indexed by question position. `None` means the
    /// participant never answered that question; at most one record per slot.
    pub answers: Vec<Option<AnswerRecordEntity>>,
}

impl ParticipantEntity {
    /// Blank participant record created on join or first answer.
    pub fn new(user_id: String, display_name: String, joined_at: SystemTime) -> Self {
        Self {
            user_id,
            display_name,
            joined_at,
            score: 0,
            correct_answers: 0,
            answers: Vec::new(),
        }
    }

    /// Sum of recorded response latencies, used as the leaderboard tie-break.
    pub fn total_response_ms(&self) -> u64 {
        self.answers
            .iter()
            .flatten()
            .map(|record| record.response_ms)
            .sum()
    }

    /// Whether a record already exists for the given question position.
    pub fn has_answered(&self, index: usize) -> bool {
        self.answers.get(index).is_some_and(Option::is_some)
    }

    /// Store a record for the given question position, growing the vector as
    /// needed, and update the cumulative counters.
    pub fn record_answer(&mut self, index: usize, record: AnswerRecordEntity) {
        if self.answers.len() <= index {
            self.answers.resize(index + 1, None);
        }
        self.score += record.points;
        if record.correct {
            self.correct_answers += 1;
        }
        self.answers[index] = Some(record);
    }
}

/// Winner snapshot embedded in a completed event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WinnerEntity {
    /// User directory identifier.
    pub user_id: String,
    /// Display name at the time the event ended.
    pub display_name: String,
    /// Final score.
    pub score: u32,
}

/// A scheduled, time-boxed live session within a daily quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEntity {
    /// Primary key of the event.
    pub id: Uuid,
    /// Date key of the owning daily quiz (`YYYY-MM-DD`).
    pub quiz_id: String,
    /// Scheduled start, UTC.
    pub start_time: SystemTime,
    /// Scheduled end, UTC.
    pub end_time: SystemTime,
    /// Forward-only lifecycle status.
    pub status: EventStatus,
    /// Index of the question currently (or last) shown, `None` before start.
    pub current_question_index: Option<usize>,
    /// Participants in join order. Order is meaningful: it is the final
    /// tie-break for winner selection.
    pub participants: Vec<ParticipantEntity>,
    /// Winner, set exactly once when the event completes.
    pub winner: Option<WinnerEntity>,
}

/// One quiz per calendar day, carrying the question rotation and its events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyQuizEntity {
    /// Civil date key, `YYYY-MM-DD` (UTC).
    pub id: String,
    /// Theme/category label for the day.
    pub theme: String,
    /// Ordered question rotation for the day.
    pub question_ids: Vec<Uuid>,
    /// The day's live events.
    pub events: Vec<EventEntity>,
}

/// Read-only quiz question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Primary key of the question.
    pub id: Uuid,
    /// Question text shown to participants.
    pub text: String,
    /// Expected answer; matching is exact and case-sensitive on the live path.
    pub correct_answer: String,
    /// Category label.
    pub category: String,
    /// Difficulty label (e.g. "easy", "medium", "hard").
    pub difficulty: String,
    /// Explanation revealed after the question ends.
    pub explanation: String,
}

/// User directory record consumed for handshake auth and leaderboard labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    /// Opaque user identifier supplied at handshake.
    pub id: String,
    /// Name shown on leaderboards.
    pub display_name: String,
    /// Subscription tier.
    pub tier: SubscriptionTier,
}
