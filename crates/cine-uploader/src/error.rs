//! Uploader error types.

use thiserror::Error;

/// Result type for uploader operations.
pub type UploaderResult<T> = Result<T, UploaderError>;

/// Errors that can occur while driving an upload from the client side.
#[derive(Debug, Error)]
pub enum UploaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Part transport error: {0}")]
    Transport(String),

    #[error("Part {part_number} failed after {attempts} attempts: {message}")]
    PartFailed {
        part_number: u32,
        attempts: u32,
        message: String,
    },

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

impl UploaderError {
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
