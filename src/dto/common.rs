use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{ParticipantEntity, QuestionEntity};

/// Question projection sent to clients while the question is live. The
/// correct answer and explanation are withheld until the question ends.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct QuestionSnapshot {
    /// Question identifier.
    pub id: Uuid,
    /// Zero-based position inside the event.
    pub index: usize,
    /// Question text.
    pub text: String,
    /// Category label.
    pub category: String,
    /// Difficulty label.
    pub difficulty: String,
    /// Answer window, milliseconds.
    pub time_limit_ms: u64,
}

impl QuestionSnapshot {
    /// Build the client-facing projection of a question about to be shown.
    pub fn from_entity(index: usize, question: &QuestionEntity, time_limit_ms: u64) -> Self {
        Self {
            id: question.id,
            index,
            text: question.text.clone(),
            category: question.category.clone(),
            difficulty: question.difficulty.clone(),
            time_limit_ms,
        }
    }
}

/// One row of an event leaderboard, already ranked.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct LeaderboardEntry {
    /// Rank, starting at 1.
    pub rank: usize,
    /// User identifier.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Cumulative score.
    pub score: u32,
    /// Correctly answered questions.
    pub correct_answers: u32,
    /// Total answer latency, the tie-break behind `score`.
    pub total_response_ms: u64,
}

impl LeaderboardEntry {
    /// Row for a participant at the given 1-based rank.
    pub fn from_participant(rank: usize, participant: &ParticipantEntity) -> Self {
        Self {
            rank,
            user_id: participant.user_id.clone(),
            display_name: participant.display_name.clone(),
            score: participant.score,
            correct_answers: participant.correct_answers,
            total_response_ms: participant.total_response_ms(),
        }
    }
}
