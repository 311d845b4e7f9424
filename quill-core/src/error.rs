//! Error types for the QuillPilot core library.

use std::fmt;

use thiserror::Error;

/// Which side of the dual-store persistence layer an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// File-backed store that survives app removal.
    Durable,
    /// Namespaced key-value mirror, lost on environment reset.
    Ephemeral,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Durable => f.write_str("durable"),
            Self::Ephemeral => f.write_str("ephemeral"),
        }
    }
}

/// Top-level error type for all QuillPilot core operations.
#[derive(Error, Debug)]
pub enum QuillError {
    /// One store could not serve the request. Recovered by falling back to
    /// the other store wherever a fallback exists.
    #[error("{store} store unavailable: {reason}")]
    StoreUnavailable {
        /// Which store failed.
        store: StoreKind,
        /// Underlying cause.
        reason: String,
    },

    /// Both stores failed on the same operation.
    #[error("No store accepted the operation (durable: {durable}; ephemeral: {ephemeral})")]
    StoresExhausted {
        /// Why the durable store failed.
        durable: String,
        /// Why the ephemeral store failed.
        ephemeral: String,
    },

    /// A single record was skipped during a batch load.
    #[error("Skipped record {record}: {reason}")]
    RecordSkipped {
        /// Store-specific record name (e.g. file name).
        record: String,
        /// Why it could not be decoded.
        reason: String,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuillError {
    /// Shorthand for a [`QuillError::StoreUnavailable`].
    pub fn unavailable(store: StoreKind, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for QuillError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, QuillError>;
