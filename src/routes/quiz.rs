use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::quiz::{EventSummary, LeaderboardResponse, QuizSummary},
    error::AppError,
    services::quiz_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/quizzes/today",
    responses(
        (status = 200, description = "Today's quiz with its events", body = QuizSummary),
        (status = 404, description = "No quiz provisioned for today"),
    )
)]
/// Return today's quiz projection, events included.
pub async fn today_quiz(State(state): State<SharedState>) -> Result<Json<QuizSummary>, AppError> {
    let quiz = quiz_service::today_quiz(&state)
        .await?
        .ok_or_else(|| AppError::NotFound("no quiz provisioned for today".into()))?;
    Ok(Json(QuizSummary::from(&quiz)))
}

#[utoipa::path(
    get,
    path = "/quizzes/{quiz_id}/events",
    params(("quiz_id" = String, Path, description = "Quiz date key, YYYY-MM-DD")),
    responses(
        (status = 200, description = "Events of the quiz", body = [EventSummary]),
        (status = 404, description = "Unknown quiz"),
    )
)]
/// List the events of one daily quiz.
pub async fn quiz_events(
    State(state): State<SharedState>,
    Path(quiz_id): Path<String>,
) -> Result<Json<Vec<EventSummary>>, AppError> {
    let quiz = quiz_service::quiz_by_date(&state, &quiz_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("quiz {quiz_id} not found")))?;
    Ok(Json(quiz.events.iter().map(EventSummary::from).collect()))
}

#[utoipa::path(
    get,
    path = "/quizzes/{quiz_id}/events/{event_id}/leaderboard",
    params(
        ("quiz_id" = String, Path, description = "Quiz date key, YYYY-MM-DD"),
        ("event_id" = Uuid, Path, description = "Event identifier"),
    ),
    responses(
        (status = 200, description = "Ranked standings of the event", body = LeaderboardResponse),
        (status = 404, description = "Unknown event"),
    )
)]
/// Return the full ranked leaderboard of one event.
pub async fn event_leaderboard(
    State(state): State<SharedState>,
    Path((quiz_id, event_id)): Path<(String, Uuid)>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let event = quiz_service::event_by_id(&state, event_id).await?;
    if event.quiz_id != quiz_id {
        return Err(AppError::NotFound(format!(
            "event {event_id} not found in quiz {quiz_id}"
        )));
    }
    Ok(Json(LeaderboardResponse {
        event_id,
        entries: quiz_service::build_leaderboard(&event.participants),
    }))
}

/// Configure the quiz routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/quizzes/today", get(today_quiz))
        .route("/quizzes/{quiz_id}/events", get(quiz_events))
        .route(
            "/quizzes/{quiz_id}/events/{event_id}/leaderboard",
            get(event_leaderboard),
        )
}
