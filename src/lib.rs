//! Library crate for trivia-live-back, exposing modules for binaries and integration tests.

/// Application configuration loading.
pub mod config;
/// Persistence layer: entities, storage abstraction, MongoDB backend.
pub mod dao;
/// Wire-format types for REST, SSE, and WebSocket surfaces.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Business logic: scheduling, live sessions, broadcasting.
pub mod services;
/// Shared application state and the event state machine.
pub mod state;
