//! The live event engine: activation, timer-paced question progression,
//! answer intake, early termination, and completion.
//!
//! Every lifecycle change follows the same discipline: plan the transition on
//! the session's state machine, perform the matching storage write, then
//! apply. A failed write aborts the plan and leaves the session untouched.

use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{AnswerRecordEntity, EventStatus, ParticipantEntity},
    dto::{
        common::QuestionSnapshot,
        ws::{AnswerResult, SubmitAnswer},
    },
    error::ServiceError,
    services::{
        quiz_service::{broadcast_leaderboard, pick_winner},
        room_events::{
            broadcast_event_ended, broadcast_event_started, broadcast_leaderboard_update,
            broadcast_participant_joined, broadcast_question_ended, broadcast_question_started,
            session_key,
        },
        scoring::score_for_response,
    },
    state::{
        ActivePhase, CompletionReason, EventPhase, EventTransition, LiveSession, SessionKey,
        SharedState, session::now_epoch_ms,
    },
};
use validator::Validate;

/// Question shown when a participant joins mid-countdown.
#[derive(Debug)]
pub struct InFlightQuestion {
    /// The question, answer withheld.
    pub question: QuestionSnapshot,
    /// Milliseconds already elapsed from its answer window.
    pub elapsed_ms: u64,
}

/// What a join attempt resolved to.
#[derive(Debug)]
pub enum JoinOutcome {
    /// The event has not started; the caller is subscribed and waiting.
    Waiting,
    /// The event is live and the caller is registered.
    Joined {
        /// Question currently showing, if any.
        in_flight: Option<InFlightQuestion>,
        /// Participants registered so far.
        participant_count: usize,
    },
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Activate a scheduled event and install its live session.
///
/// Activation is a storage-level compare-and-swap: a timer that fires for an
/// event that already ran (or was reconciled away) finds the swap lost and
/// backs off without touching anything.
pub async fn start_event(
    state: &SharedState,
    quiz_id: &str,
    event_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;

    if !store.activate_event(event_id).await? {
        info!(%event_id, "event not in scheduled status, skipping activation");
        return Ok(());
    }

    let event = store
        .find_event(event_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("event {event_id} not found")))?;
    let quiz = store
        .find_quiz(quiz_id.to_string())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz {quiz_id} not found")))?;
    let questions = store.fetch_questions(quiz.question_ids.clone()).await?;

    let key = session_key(quiz_id, event_id);
    let mut session = LiveSession::new(key.clone(), quiz.theme.clone(), questions);
    let plan = session.machine.plan(EventTransition::Activate)?;
    session.machine.apply(plan.id)?;

    let handle = state.sessions().insert(session);
    let empty = {
        let mut session = handle.lock().await;
        arm_end_timer(&mut session, state.clone(), event.end_time);
        session.questions.is_empty()
    };

    info!(session = %key, "event started");
    broadcast_event_started(state, &key, &event, &quiz.theme);

    if empty {
        warn!(session = %key, "event has no questions, completing immediately");
        end_event(state, &key, CompletionReason::QuestionsExhausted).await?;
    } else {
        // The first answer window opens with activation; the inter-question
        // delay applies only between questions.
        begin_question(state, &key, 0).await?;
    }

    Ok(())
}

/// Rebuild the session of an event that was live when the process stopped.
/// Progression resumes at the question after the last persisted index.
pub async fn resume_event(
    state: &SharedState,
    quiz_id: &str,
    event_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let event = store
        .find_event(event_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("event {event_id} not found")))?;
    let quiz = store
        .find_quiz(quiz_id.to_string())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz {quiz_id} not found")))?;
    let questions = store.fetch_questions(quiz.question_ids.clone()).await?;

    let phase = match event.current_question_index {
        None => EventPhase::Active(ActivePhase::Idle),
        Some(index) => EventPhase::Active(ActivePhase::QuestionEnded { index }),
    };

    let key = session_key(quiz_id, event_id);
    let session = LiveSession::resumed(key.clone(), quiz.theme.clone(), questions, phase);
    let handle = state.sessions().insert(session);

    let next = event.current_question_index.map_or(0, |index| index + 1);
    let exhausted = {
        let mut session = handle.lock().await;
        arm_end_timer(&mut session, state.clone(), event.end_time);
        if next < session.questions.len() {
            arm_advance(
                &mut session,
                state.clone(),
                next,
                state.config().inter_question_delay(),
            );
            false
        } else {
            true
        }
    };

    info!(session = %key, resume_at = next, "resumed live event after restart");
    if exhausted {
        end_event(state, &key, CompletionReason::QuestionsExhausted).await?;
    }
    Ok(())
}

/// Open the answer window for the question at `index`.
pub async fn begin_question(
    state: &SharedState,
    key: &SessionKey,
    index: usize,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let Some(handle) = state.sessions().get(key) else {
        debug!(session = %key, "begin-question timer fired for a finished session");
        return Ok(());
    };
    let mut session = handle.lock().await;

    let Some(question) = session.questions.get(index).cloned() else {
        drop(session);
        return end_event(state, key, CompletionReason::QuestionsExhausted).await;
    };

    let plan = match session.machine.plan(EventTransition::BeginQuestion { index }) {
        Ok(plan) => plan,
        Err(err) => {
            debug!(session = %key, index, error = ?err, "stale begin-question timer, ignoring");
            return Ok(());
        }
    };
    if let Err(err) = store.set_current_question(key.event_id, index).await {
        let _ = session.machine.abort(plan.id);
        return Err(err.into());
    }
    session.machine.apply(plan.id)?;

    session.answered.clear();
    let started_at_ms = now_epoch_ms();
    session.question_started_at_ms = Some(started_at_ms);

    let window = state.config().question_window();
    let timer_state = state.clone();
    let timer_key = key.clone();
    session.abort_question_timer();
    session.question_timer = Some(tokio::spawn(async move {
        sleep(window).await;
        if let Err(err) = end_question(&timer_state, &timer_key, index).await {
            warn!(session = %timer_key, index, error = %err, "question timeout handling failed");
        }
    }));
    let total_questions = session.questions.len();
    drop(session);

    let time_limit_ms = duration_ms(state.config().question_time_limit());
    let snapshot = QuestionSnapshot::from_entity(index, &question, time_limit_ms);
    debug!(session = %key, index, "question started");
    broadcast_question_started(state, key, snapshot, total_questions, started_at_ms);
    Ok(())
}

/// Close the question at `index`, reveal its answer, broadcast refreshed
/// standings, and schedule what comes next. Safe to call twice for the same
/// question: the second caller loses the state-machine plan and backs off.
pub async fn end_question(
    state: &SharedState,
    key: &SessionKey,
    index: usize,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let Some(handle) = state.sessions().get(key) else {
        return Ok(());
    };
    let mut session = handle.lock().await;

    let plan = match session.machine.plan(EventTransition::EndQuestion { index }) {
        Ok(plan) => plan,
        Err(err) => {
            debug!(session = %key, index, error = ?err, "stale end-question call, ignoring");
            return Ok(());
        }
    };
    session.machine.apply(plan.id)?;

    // The timeout task may be running this very function; never abort
    // ourselves or the awaits below would be cancelled mid-flight.
    if let Some(timer) = session.question_timer.take() {
        if tokio::task::try_id() != Some(timer.id()) {
            timer.abort();
        }
    }
    session.question_started_at_ms = None;

    let question = session.questions[index].clone();
    let has_next = index + 1 < session.questions.len();
    if has_next {
        arm_advance(
            &mut session,
            state.clone(),
            index + 1,
            state.config().inter_question_delay(),
        );
    }
    drop(session);

    debug!(session = %key, index, "question ended");
    broadcast_question_ended(
        state,
        key,
        index,
        &question.correct_answer,
        &question.explanation,
    );

    if let Some(event) = store.find_event(key.event_id).await? {
        broadcast_leaderboard_update(state, key, broadcast_leaderboard(&event.participants));
    }

    if !has_next {
        end_event(state, key, CompletionReason::QuestionsExhausted).await?;
    }
    Ok(())
}

/// Complete an event: persist the winner, tear down the session and room,
/// and broadcast the final standings. Completion happens exactly once; a
/// second caller loses either the machine plan or the storage swap.
pub async fn end_event(
    state: &SharedState,
    key: &SessionKey,
    reason: CompletionReason,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let Some(handle) = state.sessions().get(key) else {
        return Ok(());
    };
    let mut session = handle.lock().await;

    let plan = match session.machine.plan(EventTransition::Complete(reason)) {
        Ok(plan) => plan,
        Err(err) => {
            debug!(session = %key, error = ?err, "event already completing, ignoring");
            return Ok(());
        }
    };

    let participants = match store.find_event(key.event_id).await {
        Ok(Some(event)) => event.participants,
        Ok(None) => Vec::new(),
        Err(err) => {
            let _ = session.machine.abort(plan.id);
            return Err(err.into());
        }
    };
    let winner = pick_winner(&participants);

    match store.complete_event(key.event_id, winner.clone()).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(session = %key, "event already completed in storage");
        }
        Err(err) => {
            let _ = session.machine.abort(plan.id);
            return Err(err.into());
        }
    }
    session.machine.apply(plan.id)?;

    // The window timer may be the task running this function; aborting it is
    // fine only because nothing awaits after this point.
    session.abort_all_timers();
    drop(session);
    state.sessions().remove(key);

    info!(session = %key, reason = ?reason, "event completed");
    broadcast_event_ended(state, key, winner.as_ref(), broadcast_leaderboard(&participants));
    state.rooms().remove(key);
    Ok(())
}

/// Register a participant in an event, or subscribe them to a waiting one.
/// Joining a completed or unknown event is an explicit error.
pub async fn join_event(
    state: &SharedState,
    user_id: &str,
    display_name: &str,
    key: &SessionKey,
) -> Result<JoinOutcome, ServiceError> {
    let store = state.require_store().await?;
    let event = store
        .find_event(key.event_id)
        .await?
        .filter(|event| event.quiz_id == key.quiz_id)
        .ok_or_else(|| ServiceError::NotFound(format!("event {} not found", key.event_id)))?;

    match event.status {
        EventStatus::Completed => Err(ServiceError::InvalidState(
            "event has already completed".into(),
        )),
        EventStatus::Scheduled => Ok(JoinOutcome::Waiting),
        EventStatus::Active => {
            let (participant, newly_joined) = match store
                .find_participant(key.event_id, user_id.to_string())
                .await?
            {
                Some(existing) => (existing, false),
                None => {
                    let created = ParticipantEntity::new(
                        user_id.to_string(),
                        display_name.to_string(),
                        SystemTime::now(),
                    );
                    store
                        .save_participant(key.event_id, created.clone())
                        .await?;
                    (created, true)
                }
            };

            let participant_count = if newly_joined {
                event.participants.len() + 1
            } else {
                event.participants.len()
            };

            let mut in_flight = None;
            if let Some(handle) = state.sessions().get(key) {
                let mut session = handle.lock().await;
                session.present.insert(user_id.to_string());
                if let Some((index, question)) = session.current_question() {
                    let time_limit_ms = duration_ms(state.config().question_time_limit());
                    in_flight = Some(InFlightQuestion {
                        question: QuestionSnapshot::from_entity(index, question, time_limit_ms),
                        elapsed_ms: session.elapsed_ms(now_epoch_ms()).unwrap_or(0),
                    });
                }
            }

            // Re-joins after a dropped socket stay silent.
            if newly_joined {
                broadcast_participant_joined(state, key, &participant, participant_count);
            }
            Ok(JoinOutcome::Joined {
                in_flight,
                participant_count,
            })
        }
    }
}

/// Remove a participant from the room's presence set. If they were the last
/// holdout on the showing question, the question ends early.
pub async fn leave_event(state: &SharedState, user_id: &str, key: &SessionKey) {
    let Some(handle) = state.sessions().get(key) else {
        return;
    };
    let mut session = handle.lock().await;
    session.present.remove(user_id);

    if let Some(index) = session.machine.showing_index() {
        if session.all_present_answered() {
            session.abort_question_timer();
            spawn_end_question(state.clone(), key.clone(), index);
        }
    }
}

/// Score and record one answer for the question currently showing.
///
/// The scored latency is the client-claimed duration, floored at the
/// server-observed elapsed time. A client may report itself slower than
/// the server saw but never faster, so a forged timestamp cannot inflate
/// the score.
pub async fn submit_answer(
    state: &SharedState,
    user_id: &str,
    display_name: &str,
    submit: SubmitAnswer,
) -> Result<AnswerResult, ServiceError> {
    submit.validate()?;
    let store = state.require_store().await?;
    let key = session_key(&submit.quiz_id, submit.event_id);
    let handle = state
        .sessions()
        .get(&key)
        .ok_or_else(|| ServiceError::NotFound("event is not live".into()))?;
    let mut session = handle.lock().await;

    let Some((index, question)) = session.current_question() else {
        return Err(ServiceError::InvalidState(
            "no question is currently open".into(),
        ));
    };
    if index != submit.question_index {
        return Err(ServiceError::InvalidState(format!(
            "question {} is not open",
            submit.question_index
        )));
    }
    let question = question.clone();

    if session.answered.contains(user_id) {
        return Err(ServiceError::InvalidState(
            "answer already submitted for this question".into(),
        ));
    }

    let started_at_ms = session.question_started_at_ms.unwrap_or(0);
    let server_elapsed = session.elapsed_ms(now_epoch_ms()).unwrap_or(0);
    if server_elapsed > duration_ms(state.config().question_window()) {
        return Err(ServiceError::InvalidState("answer window closed".into()));
    }

    let claimed = submit.answer_time.saturating_sub(started_at_ms);
    let response_ms = claimed.max(server_elapsed);

    let is_correct = submit.answer == question.correct_answer;
    let time_limit_ms = duration_ms(state.config().question_time_limit());
    let points = if is_correct {
        score_for_response(response_ms, time_limit_ms)
    } else {
        0
    };

    // The persisted record is the authority on duplicates; the in-memory set
    // only shortcuts the common path.
    let mut participant = match store
        .find_participant(key.event_id, user_id.to_string())
        .await?
    {
        Some(existing) => existing,
        None => ParticipantEntity::new(
            user_id.to_string(),
            display_name.to_string(),
            SystemTime::now(),
        ),
    };
    if participant.has_answered(index) {
        return Err(ServiceError::InvalidState(
            "answer already submitted for this question".into(),
        ));
    }
    participant.record_answer(
        index,
        AnswerRecordEntity {
            correct: is_correct,
            response_ms,
            points,
        },
    );
    store.save_participant(key.event_id, participant).await?;

    session.answered.insert(user_id.to_string());
    session.present.insert(user_id.to_string());

    match store.find_event(key.event_id).await {
        Ok(Some(event)) => {
            broadcast_leaderboard_update(state, &key, broadcast_leaderboard(&event.participants));
        }
        Ok(None) => {}
        Err(err) => warn!(session = %key, error = %err, "leaderboard refresh failed after answer"),
    }

    if session.all_present_answered() {
        session.abort_question_timer();
        spawn_end_question(state.clone(), key.clone(), index);
    }

    Ok(AnswerResult {
        success: true,
        is_correct,
        score: points,
        correct_answer: question.correct_answer,
        explanation: question.explanation,
    })
}

fn spawn_end_question(state: SharedState, key: SessionKey, index: usize) {
    tokio::spawn(async move {
        if let Err(err) = end_question(&state, &key, index).await {
            warn!(session = %key, index, error = %err, "early question termination failed");
        }
    });
}

fn arm_advance(session: &mut LiveSession, state: SharedState, index: usize, delay: Duration) {
    let key = session.key.clone();
    if let Some(previous) = session.advance_timer.take() {
        previous.abort();
    }
    session.advance_timer = Some(tokio::spawn(async move {
        sleep(delay).await;
        if let Err(err) = begin_question(&state, &key, index).await {
            warn!(session = %key, index, error = %err, "failed to begin question");
        }
    }));
}

fn arm_end_timer(session: &mut LiveSession, state: SharedState, end_time: SystemTime) {
    let key = session.key.clone();
    let remaining = end_time
        .duration_since(SystemTime::now())
        .unwrap_or_default();
    if let Some(previous) = session.end_timer.take() {
        previous.abort();
    }
    session.end_timer = Some(tokio::spawn(async move {
        sleep(remaining).await;
        if let Err(err) = end_event(&state, &key, CompletionReason::WindowElapsed).await {
            warn!(session = %key, error = %err, "failed to end event on window elapse");
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use tokio::sync::broadcast::Receiver;

    use crate::{
        config::AppConfig,
        dao::{
            models::{DailyQuizEntity, EventEntity, QuestionEntity, SubscriptionTier, UserEntity},
            quiz_store::{QuizStore, memory::MemoryQuizStore},
        },
        dto::sse::ServerEvent,
        state::AppState,
    };

    fn question(text: &str, answer: &str) -> QuestionEntity {
        QuestionEntity {
            id: Uuid::new_v4(),
            text: text.to_string(),
            correct_answer: answer.to_string(),
            category: "geography".into(),
            difficulty: "easy".into(),
            explanation: format!("the answer is {answer}"),
        }
    }

    async fn seed_event(store: &MemoryQuizStore, question_count: usize) -> SessionKey {
        let questions: Vec<QuestionEntity> = (0..question_count)
            .map(|i| question(&format!("q{i}"), &format!("a{i}")))
            .collect();
        for q in &questions {
            store.add_question(q.clone());
        }

        let event_id = Uuid::new_v4();
        let quiz_id = "2026-08-30".to_string();
        let event = EventEntity {
            id: event_id,
            quiz_id: quiz_id.clone(),
            start_time: SystemTime::now(),
            end_time: SystemTime::now() + Duration::from_secs(1800),
            status: EventStatus::Scheduled,
            current_question_index: None,
            participants: Vec::new(),
            winner: None,
        };
        let quiz = DailyQuizEntity {
            id: quiz_id.clone(),
            theme: "Geography".into(),
            question_ids: questions.iter().map(|q| q.id).collect(),
            events: vec![event],
        };
        store.save_quiz(quiz).await.unwrap();
        session_key(&quiz_id, event_id)
    }

    async fn test_state(store: &MemoryQuizStore) -> SharedState {
        let state = AppState::new(AppConfig::default());
        state.install_store(Arc::new(store.clone())).await;
        state
    }

    fn user(id: &str) -> UserEntity {
        UserEntity {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            tier: SubscriptionTier::Free,
        }
    }

    fn submit(key: &SessionKey, index: usize, answer: &str) -> SubmitAnswer {
        SubmitAnswer {
            quiz_id: key.quiz_id.clone(),
            event_id: key.event_id,
            question_index: index,
            answer: answer.to_string(),
            answer_time: now_epoch_ms(),
        }
    }

    async fn expect_event(rx: &mut Receiver<ServerEvent>, name: &str) -> ServerEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out waiting for broadcast")
                .expect("broadcast channel closed");
            if event.event.as_deref() == Some(name) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn start_event_activates_and_broadcasts() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;
        let mut room_rx = state.rooms().room(&key).subscribe();
        let mut upcoming_rx = state.rooms().upcoming().subscribe();

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();

        assert_eq!(store.event_status(key.event_id), Some(EventStatus::Active));
        assert!(state.sessions().get(&key).is_some());
        expect_event(&mut room_rx, "event-started").await;
        expect_event(&mut upcoming_rx, "event-started").await;
    }

    #[tokio::test]
    async fn activation_opens_the_first_question_immediately() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;
        let mut room_rx = state.rooms().room(&key).subscribe();

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();

        // No inter-question delay before question 0.
        expect_event(&mut room_rx, "event-started").await;
        let started = expect_event(&mut room_rx, "question-started").await;
        let frame: serde_json::Value = serde_json::from_str(&started.data).unwrap();
        assert_eq!(frame["quiz_id"], key.quiz_id.as_str());
        assert_eq!(frame["total_questions"], 2);

        let handle = state.sessions().get(&key).unwrap();
        let session = handle.lock().await;
        assert_eq!(
            session.machine.phase(),
            EventPhase::Active(ActivePhase::QuestionShowing { index: 0 })
        );
    }

    #[tokio::test]
    async fn starting_an_already_active_event_is_a_no_op() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        assert_eq!(state.sessions().len(), 1);

        // A stale timer firing again loses the storage swap and backs off.
        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        assert_eq!(state.sessions().len(), 1);
    }

    #[tokio::test]
    async fn fast_correct_answer_scores_full_points() {
        let store = MemoryQuizStore::new();
        store.add_user(user("alice"));
        let key = seed_event(&store, 1).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        begin_question(&state, &key, 0).await.unwrap();

        let result = submit_answer(&state, "alice", "ALICE", submit(&key, 0, "a0"))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.is_correct);
        assert_eq!(result.score, 1000);

        let participant = store
            .find_participant(key.event_id, "alice".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(participant.score, 1000);
        assert!(participant.has_answered(0));
    }

    #[tokio::test]
    async fn wrong_answer_records_zero_points() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 1).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        begin_question(&state, &key, 0).await.unwrap();

        let result = submit_answer(&state, "bob", "BOB", submit(&key, 0, "nope"))
            .await
            .unwrap();
        assert!(result.success);
        assert!(!result.is_correct);
        assert_eq!(result.score, 0);
        // The answer is still echoed back so the client can render the reveal.
        assert_eq!(result.correct_answer, "a0");
    }

    #[tokio::test]
    async fn duplicate_answer_is_rejected() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 1).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        begin_question(&state, &key, 0).await.unwrap();

        submit_answer(&state, "bob", "BOB", submit(&key, 0, "a0"))
            .await
            .unwrap();
        let err = submit_answer(&state, "bob", "BOB", submit(&key, 0, "a0"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let participant = store
            .find_participant(key.event_id, "bob".into())
            .await
            .unwrap()
            .unwrap();
        // Only the first submission was recorded.
        assert_eq!(participant.answers.iter().flatten().count(), 1);
    }

    #[tokio::test]
    async fn forged_answer_timestamp_cannot_inflate_score() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 1).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        begin_question(&state, &key, 0).await.unwrap();

        // The question has been open for three seconds on the server's clock.
        let started_at_ms = {
            let handle = state.sessions().get(&key).unwrap();
            let mut session = handle.lock().await;
            let rewound = session.question_started_at_ms.unwrap() - 3_000;
            session.question_started_at_ms = Some(rewound);
            rewound
        };

        // The client claims it answered the instant the question opened.
        let mut forged = submit(&key, 0, "a0");
        forged.answer_time = started_at_ms;
        let result = submit_answer(&state, "mallory", "MALLORY", forged)
            .await
            .unwrap();

        assert!(result.is_correct);
        assert!(result.score < 1000);

        let participant = store
            .find_participant(key.event_id, "mallory".into())
            .await
            .unwrap()
            .unwrap();
        let record = participant.answers[0].as_ref().unwrap();
        assert!(record.response_ms >= 3_000);
    }

    #[tokio::test]
    async fn answer_for_wrong_question_index_is_rejected() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        begin_question(&state, &key, 0).await.unwrap();

        let err = submit_answer(&state, "bob", "BOB", submit(&key, 1, "a1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn question_timeout_ends_question_without_records() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        let mut room_rx = state.rooms().room(&key).subscribe();
        begin_question(&state, &key, 0).await.unwrap();

        // Nobody answers; the timeout path closes the question.
        end_question(&state, &key, 0).await.unwrap();

        let ended = expect_event(&mut room_rx, "question-ended").await;
        assert!(ended.data.contains("a0"));
        expect_event(&mut room_rx, "leaderboard-update").await;

        assert!(
            store
                .find_participant(key.event_id, "ghost".into())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn question_ends_exactly_once() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        let mut room_rx = state.rooms().room(&key).subscribe();
        begin_question(&state, &key, 0).await.unwrap();

        // Two racing closers, e.g. the timeout and the last simultaneous
        // answer. The second one loses the state-machine plan.
        end_question(&state, &key, 0).await.unwrap();
        end_question(&state, &key, 0).await.unwrap();

        expect_event(&mut room_rx, "question-ended").await;
        let mut extra_ended = 0;
        while let Ok(event) = room_rx.try_recv() {
            if event.event.as_deref() == Some("question-ended") {
                extra_ended += 1;
            }
        }
        assert_eq!(extra_ended, 0);
    }

    #[tokio::test]
    async fn all_present_answered_terminates_question_early() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        begin_question(&state, &key, 0).await.unwrap();

        join_event(&state, "alice", "ALICE", &key).await.unwrap();
        join_event(&state, "bob", "BOB", &key).await.unwrap();

        submit_answer(&state, "alice", "ALICE", submit(&key, 0, "a0"))
            .await
            .unwrap();
        submit_answer(&state, "bob", "BOB", submit(&key, 0, "wrong"))
            .await
            .unwrap();

        // The early-termination task runs off the submit path.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let handle = state.sessions().get(&key).unwrap();
        let session = handle.lock().await;
        assert_eq!(
            session.machine.phase(),
            EventPhase::Active(ActivePhase::QuestionEnded { index: 0 })
        );
    }

    #[tokio::test]
    async fn end_event_persists_winner_and_tears_down() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 1).await;
        let state = test_state(&store).await;
        let mut room_rx = state.rooms().room(&key).subscribe();

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        begin_question(&state, &key, 0).await.unwrap();
        submit_answer(&state, "alice", "ALICE", submit(&key, 0, "a0"))
            .await
            .unwrap();

        end_event(&state, &key, CompletionReason::WindowElapsed)
            .await
            .unwrap();

        assert_eq!(
            store.event_status(key.event_id),
            Some(EventStatus::Completed)
        );
        let winner = store.event_winner(key.event_id).unwrap();
        assert_eq!(winner.user_id, "alice");
        assert_eq!(winner.score, 1000);
        assert!(state.sessions().get(&key).is_none());
        expect_event(&mut room_rx, "event-ended").await;

        // A second completion attempt is silently absorbed.
        end_event(&state, &key, CompletionReason::WindowElapsed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn join_after_completion_is_rejected() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 1).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        end_event(&state, &key, CompletionReason::WindowElapsed)
            .await
            .unwrap();

        let err = join_event(&state, "late", "LATE", &key).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn join_before_start_waits() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 1).await;
        let state = test_state(&store).await;

        let outcome = join_event(&state, "early", "EARLY", &key).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Waiting));
    }

    #[tokio::test]
    async fn late_join_receives_in_flight_question() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        begin_question(&state, &key, 0).await.unwrap();

        let outcome = join_event(&state, "late", "LATE", &key).await.unwrap();
        match outcome {
            JoinOutcome::Joined {
                in_flight: Some(in_flight),
                participant_count,
            } => {
                assert_eq!(in_flight.question.index, 0);
                assert_eq!(participant_count, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejoin_does_not_rebroadcast_participant_joined() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 2).await;
        let state = test_state(&store).await;

        start_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();
        let mut room_rx = state.rooms().room(&key).subscribe();

        join_event(&state, "carol", "CAROL", &key).await.unwrap();
        // Same user reconnecting, e.g. after a dropped socket.
        join_event(&state, "carol", "CAROL", &key).await.unwrap();

        let mut joined = 0;
        while let Ok(event) = room_rx.try_recv() {
            if event.event.as_deref() == Some("participant-joined") {
                joined += 1;
            }
        }
        assert_eq!(joined, 1);
    }

    #[tokio::test]
    async fn resumed_event_continues_after_persisted_index() {
        let store = MemoryQuizStore::new();
        let key = seed_event(&store, 3).await;
        let state = test_state(&store).await;

        // Simulate a previous process that activated and played question 0.
        assert!(store.activate_event(key.event_id).await.unwrap());
        store
            .set_current_question(key.event_id, 0)
            .await
            .unwrap();

        resume_event(&state, &key.quiz_id, key.event_id)
            .await
            .unwrap();

        let handle = state.sessions().get(&key).unwrap();
        let session = handle.lock().await;
        assert_eq!(
            session.machine.phase(),
            EventPhase::Active(ActivePhase::QuestionEnded { index: 0 })
        );
        assert!(session.advance_timer.is_some());
        assert!(session.end_timer.is_some());
    }
}
