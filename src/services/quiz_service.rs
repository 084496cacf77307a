//! Read-side projections: today's quiz, event lookups, leaderboards.

use std::time::SystemTime;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    dao::models::{DailyQuizEntity, EventEntity, ParticipantEntity, WinnerEntity},
    dto::common::LeaderboardEntry,
    error::ServiceError,
    state::SharedState,
};

/// Rows included in broadcast leaderboards.
pub const LEADERBOARD_BROADCAST_LIMIT: usize = 10;

/// Civil date key (`YYYY-MM-DD`, UTC) for the given instant.
pub fn date_key(instant: SystemTime) -> String {
    OffsetDateTime::from(instant).date().to_string()
}

/// Today's civil date key, UTC.
pub fn today_key() -> String {
    date_key(SystemTime::now())
}

/// Days since the Julian epoch, used to rotate the daily theme.
pub fn day_ordinal(instant: SystemTime) -> usize {
    OffsetDateTime::from(instant).date().to_julian_day() as usize
}

/// Load today's quiz with its events, if one has been scheduled.
pub async fn today_quiz(state: &SharedState) -> Result<Option<DailyQuizEntity>, ServiceError> {
    let store = state.require_store().await?;
    Ok(store.find_quiz(today_key()).await?)
}

/// Load the quiz for a specific date key.
pub async fn quiz_by_date(
    state: &SharedState,
    date: &str,
) -> Result<Option<DailyQuizEntity>, ServiceError> {
    let store = state.require_store().await?;
    Ok(store.find_quiz(date.to_string()).await?)
}

/// Load one event, or a not-found error.
pub async fn event_by_id(state: &SharedState, event_id: Uuid) -> Result<EventEntity, ServiceError> {
    let store = state.require_store().await?;
    store
        .find_event(event_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("event {event_id} not found")))
}

/// Rank participants: score descending, then total answer latency ascending.
/// The sort is stable, so equal rows keep their roster (join) order, which is
/// the final deterministic tie-break.
pub fn build_leaderboard(participants: &[ParticipantEntity]) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&ParticipantEntity> = participants.iter().collect();
    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.total_response_ms().cmp(&b.total_response_ms()))
    });

    ranked
        .into_iter()
        .enumerate()
        .map(|(position, participant)| LeaderboardEntry::from_participant(position + 1, participant))
        .collect()
}

/// Leaderboard truncated to the broadcast limit.
pub fn broadcast_leaderboard(participants: &[ParticipantEntity]) -> Vec<LeaderboardEntry> {
    let mut entries = build_leaderboard(participants);
    entries.truncate(LEADERBOARD_BROADCAST_LIMIT);
    entries
}

/// Winner of an event: the head of the leaderboard ordering, or `None` when
/// nobody participated.
pub fn pick_winner(participants: &[ParticipantEntity]) -> Option<WinnerEntity> {
    let head = build_leaderboard(participants).into_iter().next()?;
    Some(WinnerEntity {
        user_id: head.user_id,
        display_name: head.display_name,
        score: head.score,
    })
}
