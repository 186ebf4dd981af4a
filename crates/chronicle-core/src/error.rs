use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`ChronicleError`].
pub type ChronicleResult<T> = Result<T, ChronicleError>;

/// Top-level error type for Chronicle.
///
/// Store operations either succeed with a consistent post-state or return one
/// of these variants with in-memory state left exactly as before the call.
#[derive(Error, Debug)]
pub enum ChronicleError {
    /// The session store was used before `initialize()` completed.
    #[error("Session store is not initialized")]
    NotInitialized,

    /// An operation referenced a session id the store does not hold.
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// The persisted resource exists but could not be parsed or validated.
    #[error("Corrupt storage: {0}")]
    CorruptStorage(String),

    /// A durable write could not complete (disk full, permission denied, ...).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Caller input was malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid configuration, including unparsable watch patterns.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChronicleError {
    /// Returns `true` for failures of the durable write path.
    pub fn is_persistence(&self) -> bool {
        matches!(self, ChronicleError::Persistence(_))
    }
}
