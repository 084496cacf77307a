use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{DailyQuizEntity, EventEntity, EventStatus, WinnerEntity},
    dto::{common::LeaderboardEntry, format_system_time},
};

/// Winner projection embedded in completed event summaries.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct WinnerSummary {
    /// User identifier.
    pub user_id: String,
    /// Display name at the time the event ended.
    pub display_name: String,
    /// Final score.
    pub score: u32,
}

impl From<&WinnerEntity> for WinnerSummary {
    fn from(winner: &WinnerEntity) -> Self {
        Self {
            user_id: winner.user_id.clone(),
            display_name: winner.display_name.clone(),
            score: winner.score,
        }
    }
}

/// Wire form of the event lifecycle status.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatusDto {
    /// Waiting for its start time.
    Scheduled,
    /// Currently running.
    Active,
    /// Finished; winner and scores frozen.
    Completed,
}

impl From<EventStatus> for EventStatusDto {
    fn from(status: EventStatus) -> Self {
        match status {
            EventStatus::Scheduled => EventStatusDto::Scheduled,
            EventStatus::Active => EventStatusDto::Active,
            EventStatus::Completed => EventStatusDto::Completed,
        }
    }
}

/// REST projection of one live event.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct EventSummary {
    /// Event identifier.
    pub id: Uuid,
    /// Date key of the owning quiz.
    pub quiz_id: String,
    /// Scheduled start, RFC 3339.
    pub start_time: String,
    /// Scheduled end, RFC 3339.
    pub end_time: String,
    /// Lifecycle status.
    pub status: EventStatusDto,
    /// Number of participants who joined or answered.
    pub participant_count: usize,
    /// Winner, present once the event completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<WinnerSummary>,
}

impl From<&EventEntity> for EventSummary {
    fn from(event: &EventEntity) -> Self {
        Self {
            id: event.id,
            quiz_id: event.quiz_id.clone(),
            start_time: format_system_time(event.start_time),
            end_time: format_system_time(event.end_time),
            status: event.status.into(),
            participant_count: event.participants.len(),
            winner: event.winner.as_ref().map(WinnerSummary::from),
        }
    }
}

/// REST projection of a daily quiz. Question IDs stay server-side.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizSummary {
    /// Civil date key, `YYYY-MM-DD`.
    pub id: String,
    /// Theme of the day.
    pub theme: String,
    /// Number of questions in the rotation.
    pub question_count: usize,
    /// The day's events.
    pub events: Vec<EventSummary>,
}

impl From<&DailyQuizEntity> for QuizSummary {
    fn from(quiz: &DailyQuizEntity) -> Self {
        Self {
            id: quiz.id.clone(),
            theme: quiz.theme.clone(),
            question_count: quiz.question_ids.len(),
            events: quiz.events.iter().map(EventSummary::from).collect(),
        }
    }
}

/// Ranked leaderboard for one event.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    /// Event identifier.
    pub event_id: Uuid,
    /// Ranked rows, best first.
    pub entries: Vec<LeaderboardEntry>,
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn event_summary_carries_wire_status() {
        let event = EventEntity {
            id: Uuid::new_v4(),
            quiz_id: "2026-08-30".into(),
            start_time: SystemTime::now(),
            end_time: SystemTime::now(),
            status: EventStatus::Active,
            current_question_index: Some(1),
            participants: Vec::new(),
            winner: None,
        };

        let summary = EventSummary::from(&event);
        assert_eq!(summary.status, EventStatusDto::Active);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "active");
    }
}
