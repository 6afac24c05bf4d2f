//! Error types for the flusher.

use mirror_database::DatabaseError;
use thiserror::Error;

/// Flusher error type.
#[derive(Error, Debug)]
pub enum FlushError {
    /// No handler is registered for the message kind
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    /// Store error, passed through unchanged
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The payload does not have the shape its handler needs
    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: String, reason: String },

    /// A stream line is not a `{"key": …, "value": …}` message
    #[error("Invalid message on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// IO error reading the stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlushError {
    pub(crate) fn malformed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        FlushError::MalformedPayload {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// True when the store rejected a duplicate key.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, FlushError::Database(e) if e.is_unique_violation())
    }
}

impl From<rusqlite::Error> for FlushError {
    fn from(e: rusqlite::Error) -> Self {
        FlushError::Database(DatabaseError::Sqlite(e))
    }
}

/// Result type for flusher operations.
pub type FlushResult<T> = Result<T, FlushError>;
