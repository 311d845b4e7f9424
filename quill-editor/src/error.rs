//! Errors surfaced to the editor.

use quill_core::QuillError;
use quill_llm::LlmError;
use thiserror::Error;

/// Anything a workspace operation can fail with.
#[derive(Debug, Error)]
pub enum EditorError {
    /// Provider selection or generation failed.
    #[error(transparent)]
    Generation(#[from] LlmError),

    /// Document storage failed.
    #[error(transparent)]
    Storage(#[from] QuillError),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl EditorError {
    /// Short message suitable for showing to the writer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Generation(e) => e.user_message(),
            Self::Storage(QuillError::StoresExhausted { .. }) => {
                "Your document could not be saved anywhere. Copy its text somewhere safe.".into()
            }
            Self::Storage(e) => format!("Storage problem: {e}"),
            Self::Task(_) => "Something went wrong in the background. Please try again.".into(),
        }
    }
}

impl From<tokio::task::JoinError> for EditorError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result alias for workspace operations.
pub type Result<T> = std::result::Result<T, EditorError>;
