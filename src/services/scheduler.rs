//! Daily quiz provisioning and event start timing.
//!
//! One long-lived task creates the day's quiz at startup and at every UTC
//! midnight, arms a start timer per scheduled event, and reconciles events
//! whose window elapsed while the process was down.

use std::time::{Duration, SystemTime};

use time::{Date, OffsetDateTime};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{DailyQuizEntity, EventEntity, EventStatus},
    error::ServiceError,
    services::{
        quiz_service::pick_winner,
        room_events::session_key,
        session_driver::{resume_event, start_event},
    },
    state::SharedState,
};

/// Pause before retrying a failed scheduler pass.
const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Scheduler loop. Waits out degraded mode, provisions the current day, then
/// sleeps until the next UTC midnight.
pub async fn run(state: SharedState) {
    let mut degraded_rx = state.degraded_watcher();

    loop {
        while *degraded_rx.borrow() {
            if degraded_rx.changed().await.is_err() {
                return;
            }
        }

        if let Err(err) = provision_day(&state).await {
            error!(error = %err, "scheduler pass failed, retrying");
            sleep(RETRY_DELAY).await;
            continue;
        }

        let pause = until_next_midnight();
        info!(sleep_secs = pause.as_secs(), "scheduler sleeping until next day");
        tokio::select! {
            _ = sleep(pause) => {}
            // Storage dropped out; go back to waiting for it.
            changed = degraded_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

/// One scheduler pass: reconcile leftovers, ensure today's quiz exists, and
/// arm timers for its events.
async fn provision_day(state: &SharedState) -> Result<(), ServiceError> {
    let reconciled = reconcile_stale_events(state).await?;
    if reconciled > 0 {
        info!(count = reconciled, "reconciled stale events at startup");
    }

    let today = OffsetDateTime::now_utc().date();
    let quiz = ensure_daily_quiz(state, today).await?;
    arm_event_timers(state, &quiz);
    Ok(())
}

/// Create (or return) the quiz document for the given date. Creation is
/// idempotent: an existing document wins and is returned unchanged, so two
/// concurrent passes for one date produce a single quiz.
pub async fn ensure_daily_quiz(
    state: &SharedState,
    date: Date,
) -> Result<DailyQuizEntity, ServiceError> {
    let store = state.require_store().await?;
    let date_key = date.to_string();

    if let Some(existing) = store.find_quiz(date_key.clone()).await? {
        return Ok(existing);
    }

    let config = state.config();
    let question_ids = store
        .sample_question_ids(config.questions_per_quiz())
        .await?;
    if question_ids.is_empty() {
        return Err(ServiceError::InvalidState(
            "question bank is empty, cannot provision a daily quiz".into(),
        ));
    }

    let theme = config
        .theme_for_day(date.to_julian_day() as usize)
        .to_string();

    let mut events = Vec::with_capacity(config.event_slots().len());
    for slot in config.event_slots() {
        let start_of_day = date
            .with_hms(slot.hour, slot.minute, 0)
            .map_err(|err| {
                ServiceError::InvalidInput(format!(
                    "invalid event slot {:02}:{:02}: {err}",
                    slot.hour, slot.minute
                ))
            })?
            .assume_utc();
        let start_time: SystemTime = start_of_day.into();
        events.push(EventEntity {
            id: Uuid::new_v4(),
            quiz_id: date_key.clone(),
            start_time,
            end_time: start_time + config.event_duration(),
            status: EventStatus::Scheduled,
            current_question_index: None,
            participants: Vec::new(),
            winner: None,
        });
    }

    let quiz = DailyQuizEntity {
        id: date_key.clone(),
        theme,
        question_ids,
        events,
    };
    store.save_quiz(quiz.clone()).await?;
    info!(
        date = %date_key,
        theme = %quiz.theme,
        events = quiz.events.len(),
        "provisioned daily quiz"
    );
    Ok(quiz)
}

/// Arm a start timer per scheduled event, and resume events that were live
/// when the previous process stopped. Duplicate timers are harmless: the
/// activation swap lets exactly one of them through.
pub fn arm_event_timers(state: &SharedState, quiz: &DailyQuizEntity) {
    let now = SystemTime::now();

    for event in &quiz.events {
        if event.end_time <= now {
            // Window fully elapsed; reconciliation owns these.
            continue;
        }
        match event.status {
            EventStatus::Completed => {}
            EventStatus::Active => {
                let key = session_key(&quiz.id, event.id);
                if state.sessions().get(&key).is_some() {
                    continue;
                }
                let state = state.clone();
                let quiz_id = quiz.id.clone();
                let event_id = event.id;
                tokio::spawn(async move {
                    if let Err(err) = resume_event(&state, &quiz_id, event_id).await {
                        warn!(%event_id, error = %err, "failed to resume live event");
                    }
                });
            }
            EventStatus::Scheduled => {
                let delay = event
                    .start_time
                    .duration_since(now)
                    .unwrap_or_default();
                let state = state.clone();
                let quiz_id = quiz.id.clone();
                let event_id = event.id;
                tokio::spawn(async move {
                    sleep(delay).await;
                    if let Err(err) = start_event(&state, &quiz_id, event_id).await {
                        warn!(%event_id, error = %err, "failed to start scheduled event");
                    }
                });
            }
        }
    }
}

/// Force-complete events whose window elapsed while no process was watching.
/// The winner comes from the persisted scores; no broadcasts are sent, since
/// whoever was in those rooms is long gone.
pub async fn reconcile_stale_events(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_store().await?;
    let stale = store.find_stale_events(SystemTime::now()).await?;
    let count = stale.len();

    for event in stale {
        let winner = pick_winner(&event.participants);
        if store.complete_event(event.id, winner).await? {
            info!(event_id = %event.id, "reconciled stale event");
        }
    }

    Ok(count)
}

fn until_next_midnight() -> Duration {
    let now = OffsetDateTime::now_utc();
    let Some(tomorrow) = now.date().next_day() else {
        return Duration::from_secs(3600);
    };
    let next = tomorrow.midnight().assume_utc();
    (next - now).try_into().unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use time::Month;

    use crate::{
        config::AppConfig,
        dao::{
            models::QuestionEntity,
            quiz_store::{QuizStore, memory::MemoryQuizStore},
        },
        state::AppState,
    };

    fn seed_questions(store: &MemoryQuizStore, count: usize) {
        for i in 0..count {
            store.add_question(QuestionEntity {
                id: Uuid::new_v4(),
                text: format!("q{i}"),
                correct_answer: format!("a{i}"),
                category: "misc".into(),
                difficulty: "easy".into(),
                explanation: String::new(),
            });
        }
    }

    async fn test_state(store: &MemoryQuizStore) -> SharedState {
        let state = AppState::new(AppConfig::default());
        state.install_store(Arc::new(store.clone())).await;
        state
    }

    fn test_date() -> Date {
        Date::from_calendar_date(2026, Month::August, 30).unwrap()
    }

    #[tokio::test]
    async fn ensure_daily_quiz_is_idempotent() {
        let store = MemoryQuizStore::new();
        seed_questions(&store, 20);
        let state = test_state(&store).await;

        let first = ensure_daily_quiz(&state, test_date()).await.unwrap();
        let second = ensure_daily_quiz(&state, test_date()).await.unwrap();

        assert_eq!(store.quiz_count(), 1);
        assert_eq!(first.id, second.id);
        assert_eq!(first.question_ids, second.question_ids);
        assert_eq!(
            first.events.iter().map(|e| e.id).collect::<Vec<_>>(),
            second.events.iter().map(|e| e.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn daily_quiz_carries_configured_slots_and_rotation() {
        let store = MemoryQuizStore::new();
        seed_questions(&store, 20);
        let state = test_state(&store).await;

        let quiz = ensure_daily_quiz(&state, test_date()).await.unwrap();

        assert_eq!(quiz.id, "2026-08-30");
        assert_eq!(quiz.events.len(), state.config().event_slots().len());
        assert_eq!(
            quiz.question_ids.len(),
            state.config().questions_per_quiz()
        );
        for event in &quiz.events {
            assert_eq!(event.status, EventStatus::Scheduled);
            assert_eq!(
                event.end_time,
                event.start_time + state.config().event_duration()
            );
        }
    }

    #[tokio::test]
    async fn empty_question_bank_fails_provisioning() {
        let store = MemoryQuizStore::new();
        let state = test_state(&store).await;

        let err = ensure_daily_quiz(&state, test_date()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(store.quiz_count(), 0);
    }

    #[tokio::test]
    async fn reconciliation_completes_elapsed_events() {
        let store = MemoryQuizStore::new();
        let state = test_state(&store).await;

        // An event whose whole window passed while the process was down.
        let event_id = Uuid::new_v4();
        let quiz = DailyQuizEntity {
            id: "2026-08-29".into(),
            theme: "History".into(),
            question_ids: Vec::new(),
            events: vec![EventEntity {
                id: event_id,
                quiz_id: "2026-08-29".into(),
                start_time: SystemTime::now() - Duration::from_secs(7200),
                end_time: SystemTime::now() - Duration::from_secs(3600),
                status: EventStatus::Active,
                current_question_index: Some(3),
                participants: Vec::new(),
                winner: None,
            }],
        };
        store.save_quiz(quiz).await.unwrap();

        let reconciled = reconcile_stale_events(&state).await.unwrap();

        assert_eq!(reconciled, 1);
        assert_eq!(store.event_status(event_id), Some(EventStatus::Completed));
    }
}
