use thiserror::Error;
use uuid::Uuid;

use crate::dao::storage::StorageError;

/// Result alias for MongoDB DAO operations.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Errors raised by the MongoDB quiz store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("invalid MongoDB URI `{uri}`")]
    InvalidUri {
        /// Offending connection string.
        uri: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// The client could not be constructed from parsed options.
    #[error("failed to build MongoDB client")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// The initial ping never succeeded within the allowed attempts.
    #[error("MongoDB unreachable after {attempts} ping attempts")]
    InitialPing {
        /// Number of attempts made.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A health-check ping failed.
    #[error("MongoDB health ping failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// Index creation failed during bootstrap.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection being indexed.
        collection: &'static str,
        /// Index key description.
        index: &'static str,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A quiz document write failed.
    #[error("failed to save quiz `{id}`")]
    SaveQuiz {
        /// Quiz date key.
        id: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A quiz document read failed.
    #[error("failed to load quiz `{id}`")]
    LoadQuiz {
        /// Quiz date key.
        id: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// An event document operation failed.
    #[error("failed to access event `{id}`")]
    Event {
        /// Event primary key.
        id: Uuid,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A participant document operation failed.
    #[error("failed to access participants of event `{event_id}`")]
    Participant {
        /// Owning event.
        event_id: Uuid,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// The stale-event scan failed.
    #[error("failed to scan for stale events")]
    StaleScan {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A question collection read failed.
    #[error("failed to load questions")]
    Questions {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A user directory read failed.
    #[error("failed to load user `{id}`")]
    User {
        /// User identifier.
        id: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
}

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::backend(err)
    }
}
