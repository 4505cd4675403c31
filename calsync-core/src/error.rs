//! Error types for calsync.

use thiserror::Error;

/// Errors that can occur while reconciling calendars.
#[derive(Error, Debug)]
pub enum CalSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Cannot delete '{0}': target event has no id")]
    MissingEventId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CalSyncError {
    /// Whether retrying the same call may succeed (rate limiting, server
    /// errors, dropped connections).
    pub fn is_transient(&self) -> bool {
        match self {
            CalSyncError::Transport(_) => true,
            CalSyncError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CalSyncError {
    fn from(err: serde_json::Error) -> Self {
        CalSyncError::Serialization(err.to_string())
    }
}

/// Result type alias for calsync operations.
pub type CalSyncResult<T> = Result<T, CalSyncError>;
