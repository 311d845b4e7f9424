//! Generation error types.

use thiserror::Error;

/// Errors that can occur while selecting a provider or generating text.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Neither the requested provider nor any fallback is available.
    #[error("no generation provider is available")]
    NoProviderAvailable,

    /// The backend could not be reached (connection refused, DNS, reset).
    #[error("generation backend unreachable: {0}")]
    ProviderUnreachable(String),

    /// The backend did not answer in time.
    #[error("generation request timed out after {0}ms")]
    ProviderTimeout(u64),

    /// The backend answered but refused or failed the request.
    #[error("generation rejected: {0}")]
    ProviderRejected(String),

    /// One stream line was not valid JSON. Dropped by the frame parser and
    /// never surfaced to callers.
    #[error("malformed stream payload: {0}")]
    MalformedStreamPayload(String),

    /// Provider preferences could not be read or written.
    #[error("provider preferences error: {0}")]
    Preferences(String),

    /// Configuration error.
    #[error("generation configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Short message suitable for showing to the writer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NoProviderAvailable => {
                "No AI provider is available. Start Ollama or configure an OpenAI key, then try again.".into()
            }
            Self::ProviderUnreachable(_) => {
                "Could not reach the AI backend. Make sure it is running and try again.".into()
            }
            Self::ProviderTimeout(_) => "The AI provider took too long to answer. Try a shorter length or try again.".into(),
            Self::ProviderRejected(detail) => format!("The AI provider could not complete the request: {detail}"),
            Self::MalformedStreamPayload(_) => "The AI provider sent an unreadable response.".into(),
            Self::Preferences(_) | Self::Config(_) => format!("Generation is misconfigured: {self}"),
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnreachable(_) | Self::ProviderTimeout(_))
    }

    /// Map a transport error, recording the timeout that applied.
    pub(crate) fn from_transport(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            LlmError::ProviderTimeout(timeout_ms)
        } else {
            LlmError::from(err)
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::ProviderTimeout(0)
        } else if err.is_decode() || err.is_body() || err.is_status() {
            LlmError::ProviderRejected(err.to_string())
        } else {
            LlmError::ProviderUnreachable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_are_non_empty_and_specific() {
        let rejected = LlmError::ProviderRejected("model not found".into());
        assert!(rejected.user_message().contains("model not found"));
        assert!(LlmError::NoProviderAvailable.user_message().contains("No AI provider"));
        assert!(!LlmError::ProviderTimeout(10).user_message().is_empty());
    }

    #[test]
    fn only_transport_failures_are_transient() {
        assert!(LlmError::ProviderTimeout(5).is_transient());
        assert!(LlmError::ProviderUnreachable("refused".into()).is_transient());
        assert!(!LlmError::ProviderRejected("bad".into()).is_transient());
        assert!(!LlmError::NoProviderAvailable.is_transient());
    }
}
