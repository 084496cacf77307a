use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Trivia Live.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::quiz::today_quiz,
        crate::routes::quiz::quiz_events,
        crate::routes::quiz::event_leaderboard,
        crate::routes::sse::upcoming_stream,
        crate::routes::sse::event_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::quiz::QuizSummary,
            crate::dto::quiz::EventSummary,
            crate::dto::quiz::EventStatusDto,
            crate::dto::quiz::WinnerSummary,
            crate::dto::quiz::LeaderboardResponse,
            crate::dto::common::QuestionSnapshot,
            crate::dto::common::LeaderboardEntry,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::SubmitAnswer,
            crate::dto::ws::IdentifyAck,
            crate::dto::ws::JoinAck,
            crate::dto::ws::AnswerResult,
            crate::dto::ws::ErrorMessage,
            crate::dto::sse::Handshake,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quizzes", description = "Daily quiz and event projections"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "ws", description = "WebSocket operations for participants"),
    )
)]
pub struct ApiDoc;
