//! Error types shared across the tracker workspace.

use thiserror::Error;

/// Result type alias using the tracker [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by tracker operations.
///
/// Guard checks (`can_start`, `can_complete`) are *not* errors; they return
/// plain gate values from the engine. Everything here aborts the single
/// operation that raised it.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad argument, type, or missing field.
    #[error("{0}")]
    Input(String),

    /// No such plan (or other missing record).
    #[error("{0}")]
    NotFound(String),

    /// A lifecycle guard failed, e.g. deleting a non-open plan.
    #[error("{0}")]
    State(String),

    /// Dependency violation: cycle, cross-project edge, or missing predecessor.
    #[error("{0}")]
    Dependency(String),

    /// A git command exited non-zero. Carries the underlying stderr.
    #[error("git {command} failed: {stderr}")]
    Vcs { command: String, stderr: String },

    /// The agent subprocess exited non-zero.
    #[error("agent exited with status {code}")]
    Agent { code: i32 },

    /// Database failure from the embedded SQL engine.
    #[error("database error: {0}")]
    Database(String),

    /// Filesystem or log I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed configuration. Callers recover by loading defaults.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl Error {
    /// True when the error maps to a user mistake rather than a fault.
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Input(_) | Self::NotFound(_) | Self::State(_) | Self::Dependency(_)
        )
    }
}
