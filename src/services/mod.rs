/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Read-only quiz, event, and leaderboard projections.
pub mod quiz_service;
/// Typed room and upcoming-feed broadcasts.
pub mod room_events;
/// Daily quiz provisioning and event start timing.
pub mod scheduler;
/// Latency-based answer scoring.
pub mod scoring;
/// The live event engine driving question progression.
pub mod session_driver;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervision and degraded-mode handling.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
