/// Test-only in-memory backend.
#[cfg(test)]
pub mod memory;
/// MongoDB backend.
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    DailyQuizEntity, EventEntity, ParticipantEntity, QuestionEntity, UserEntity, WinnerEntity,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for daily quizzes, live events,
/// participants, and the read-only question and user collections.
pub trait QuizStore: Send + Sync {
    /// Upsert a daily quiz and its embedded events.
    fn save_quiz(&self, quiz: DailyQuizEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a daily quiz by its date key, events and participants included.
    fn find_quiz(&self, date: String)
    -> BoxFuture<'static, StorageResult<Option<DailyQuizEntity>>>;
    /// Load a single event with its participants.
    fn find_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<Option<EventEntity>>>;
    /// Move a `scheduled` event to `active`. Returns false when the event was
    /// not in the `scheduled` status (compare-and-swap at the document level).
    fn activate_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Write through the index of the question currently showing.
    fn set_current_question(
        &self,
        event_id: Uuid,
        index: usize,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Move an event to `completed` and persist its winner. Returns false when
    /// the event was already completed (completion happens exactly once).
    fn complete_event(
        &self,
        event_id: Uuid,
        winner: Option<WinnerEntity>,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Upsert a participant record keyed by (event, user).
    fn save_participant(
        &self,
        event_id: Uuid,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a single participant record.
    fn find_participant(
        &self,
        event_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Events whose window has fully elapsed but whose status never reached
    /// `completed`; consumed by the startup reconciliation pass.
    fn find_stale_events(
        &self,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>>;
    /// Fetch questions by ID, preserving the requested order.
    fn fetch_questions(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    /// Pick `count` random question IDs for the daily rotation.
    fn sample_question_ids(&self, count: usize) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;
    /// Look up a user in the directory.
    fn find_user(&self, id: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Cheap liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
