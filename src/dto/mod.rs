use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Projections shared between surfaces.
pub mod common;
/// Health endpoint payloads.
pub mod health;
/// REST projections of quizzes and events.
pub mod quiz;
/// Broadcast event payloads.
pub mod sse;
/// WebSocket message types.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
