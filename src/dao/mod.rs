/// Database model definitions.
pub mod models;
/// Quiz, event, and participant storage operations.
pub mod quiz_store;
/// Storage abstraction layer for database operations.
pub mod storage;
