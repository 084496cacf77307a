use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    services::sse_service,
    state::{SessionKey, SharedState},
};

#[utoipa::path(
    get,
    path = "/quizzes/today/stream",
    responses((status = 200, description = "Upcoming-events SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream announcements about upcoming and starting events.
pub async fn upcoming_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_upcoming(&state);
    info!("new upcoming-events SSE connection");
    let handshake = sse_service::handshake_event(&state, "upcoming");
    sse_service::to_sse_stream(receiver, handshake, "upcoming".into())
}

#[utoipa::path(
    get,
    path = "/quizzes/{quiz_id}/events/{event_id}/stream",
    params(
        ("quiz_id" = String, Path, description = "Quiz date key, YYYY-MM-DD"),
        ("event_id" = Uuid, Path, description = "Event identifier"),
    ),
    responses((status = 200, description = "Event room SSE stream", content_type = "text/event-stream", body = String))
)]
/// Spectate one event room over SSE.
pub async fn event_stream(
    State(state): State<SharedState>,
    Path((quiz_id, event_id)): Path<(String, Uuid)>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let key = SessionKey { quiz_id, event_id };
    let receiver = sse_service::subscribe_room(&state, &key);
    let label = key.to_string();
    info!(room = %label, "new event room SSE connection");
    let handshake = sse_service::handshake_event(&state, &label);
    sse_service::to_sse_stream(receiver, handshake, label)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/quizzes/today/stream", get(upcoming_stream))
        .route("/quizzes/{quiz_id}/events/{event_id}/stream", get(event_stream))
}
