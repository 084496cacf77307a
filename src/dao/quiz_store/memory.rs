//! In-memory [`QuizStore`] used by unit tests. Mirrors the MongoDB backend's
//! collection split so tests exercise the same assembly paths.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{
        DailyQuizEntity, EventEntity, EventStatus, ParticipantEntity, QuestionEntity, UserEntity,
        WinnerEntity,
    },
    quiz_store::QuizStore,
    storage::StorageResult,
};

#[derive(Default)]
struct MemoryState {
    quizzes: HashMap<String, DailyQuizEntity>,
    events: HashMap<Uuid, EventEntity>,
    participants: HashMap<(Uuid, String), ParticipantEntity>,
    questions: Vec<QuestionEntity>,
    users: HashMap<String, UserEntity>,
}

/// Lock-protected in-memory backend.
#[derive(Clone, Default)]
pub struct MemoryQuizStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryQuizStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the question bank.
    pub fn add_question(&self, question: QuestionEntity) {
        self.inner.lock().unwrap().questions.push(question);
    }

    /// Seed the user directory.
    pub fn add_user(&self, user: UserEntity) {
        self.inner
            .lock()
            .unwrap()
            .users
            .insert(user.id.clone(), user);
    }

    /// Current persisted status of an event, for assertions.
    pub fn event_status(&self, event_id: Uuid) -> Option<EventStatus> {
        self.inner
            .lock()
            .unwrap()
            .events
            .get(&event_id)
            .map(|event| event.status)
    }

    /// Current persisted winner of an event, for assertions.
    pub fn event_winner(&self, event_id: Uuid) -> Option<WinnerEntity> {
        self.inner
            .lock()
            .unwrap()
            .events
            .get(&event_id)
            .and_then(|event| event.winner.clone())
    }

    /// Number of quizzes stored, for idempotence assertions.
    pub fn quiz_count(&self) -> usize {
        self.inner.lock().unwrap().quizzes.len()
    }

    fn assemble_event(state: &MemoryState, event: &EventEntity) -> EventEntity {
        let mut participants: Vec<ParticipantEntity> = state
            .participants
            .iter()
            .filter(|((event_id, _), _)| *event_id == event.id)
            .map(|(_, participant)| participant.clone())
            .collect();
        participants.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let mut assembled = event.clone();
        assembled.participants = participants;
        assembled
    }
}

impl QuizStore for MemoryQuizStore {
    fn save_quiz(&self, quiz: DailyQuizEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().unwrap();
            for event in &quiz.events {
                state.events.insert(event.id, event.clone());
            }
            state.quizzes.insert(quiz.id.clone(), quiz);
            Ok(())
        })
    }

    fn find_quiz(
        &self,
        date: String,
    ) -> BoxFuture<'static, StorageResult<Option<DailyQuizEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().unwrap();
            let Some(quiz) = state.quizzes.get(&date) else {
                return Ok(None);
            };

            let mut assembled = quiz.clone();
            let mut events: Vec<EventEntity> = quiz
                .events
                .iter()
                .filter_map(|event| state.events.get(&event.id))
                .map(|event| MemoryQuizStore::assemble_event(&state, event))
                .collect();
            events.sort_by_key(|event| event.start_time);
            assembled.events = events;
            Ok(Some(assembled))
        })
    }

    fn find_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<Option<EventEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().unwrap();
            Ok(state
                .events
                .get(&event_id)
                .map(|event| MemoryQuizStore::assemble_event(&state, event)))
        })
    }

    fn activate_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().unwrap();
            match state.events.get_mut(&event_id) {
                Some(event) if event.status == EventStatus::Scheduled => {
                    event.status = EventStatus::Active;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn set_current_question(
        &self,
        event_id: Uuid,
        index: usize,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().unwrap();
            if let Some(event) = state.events.get_mut(&event_id) {
                if event.status == EventStatus::Active {
                    event.current_question_index = Some(index);
                }
            }
            Ok(())
        })
    }

    fn complete_event(
        &self,
        event_id: Uuid,
        winner: Option<WinnerEntity>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().unwrap();
            match state.events.get_mut(&event_id) {
                Some(event) if event.status != EventStatus::Completed => {
                    event.status = EventStatus::Completed;
                    event.winner = winner;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn save_participant(
        &self,
        event_id: Uuid,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().unwrap();
            state
                .participants
                .insert((event_id, participant.user_id.clone()), participant);
            Ok(())
        })
    }

    fn find_participant(
        &self,
        event_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().unwrap();
            Ok(state.participants.get(&(event_id, user_id)).cloned())
        })
    }

    fn find_stale_events(
        &self,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().unwrap();
            Ok(state
                .events
                .values()
                .filter(|event| event.status != EventStatus::Completed && event.end_time < now)
                .map(|event| MemoryQuizStore::assemble_event(&state, event))
                .collect())
        })
    }

    fn fetch_questions(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().unwrap();
            Ok(ids
                .into_iter()
                .filter_map(|id| state.questions.iter().find(|q| q.id == id).cloned())
                .collect())
        })
    }

    fn sample_question_ids(&self, count: usize) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().unwrap();
            Ok(state.questions.iter().take(count).map(|q| q.id).collect())
        })
    }

    fn find_user(&self, id: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.lock().unwrap().users.get(&id).cloned()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}
