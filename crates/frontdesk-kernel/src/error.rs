//! Shared failure taxonomy for the call pipeline.
//!
//! Every provider failure is recovered locally by the component that owns
//! the provider and reaches the orchestrator only as one of these variants.
//! Only [`CallFailure::GatewayProtocol`] and
//! [`CallFailure::InvariantViolation`] terminate a call involuntarily; the
//! rest degrade to a spoken fallback or a graceful goodbye.

use std::fmt;
use thiserror::Error;

/// Result alias for call-pipeline operations.
pub type CallResult<T> = Result<T, CallFailure>;

/// Classified failures observed during a call.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CallFailure {
    /// Malformed frames or handshake violations from the telephony gateway.
    #[error("telephony gateway protocol violation: {0}")]
    GatewayProtocol(String),

    /// The STT session ended abnormally.
    #[error("transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    /// The TTS provider is failing.
    #[error("synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    /// Model transport error or turn timeout.
    #[error("reasoning unavailable: {0}")]
    ReasoningUnavailable(String),

    /// Store or embedding provider unreachable during retrieval.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Store write failed while persisting a call record.
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Internal bug, e.g. an out-of-order transcript append. Fatal to the
    /// call.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl CallFailure {
    /// Whether this failure must tear the call down. Everything else is
    /// recovered in place with degraded behavior.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CallFailure::GatewayProtocol(_) | CallFailure::InvariantViolation(_)
        )
    }

    /// Build the invariant violation raised on an illegal phase transition.
    pub fn invalid_transition(from: impl fmt::Debug, to: impl fmt::Debug) -> Self {
        CallFailure::InvariantViolation(format!(
            "illegal call phase transition: {:?} -> {:?}",
            from, to
        ))
    }
}

impl From<crate::store::StoreError> for CallFailure {
    fn from(err: crate::store::StoreError) -> Self {
        CallFailure::PersistenceUnavailable(err.to_string())
    }
}

impl From<crate::embedding::EmbeddingError> for CallFailure {
    fn from(err: crate::embedding::EmbeddingError) -> Self {
        CallFailure::RetrievalUnavailable(err.to_string())
    }
}

impl From<crate::speech::SpeechError> for CallFailure {
    fn from(err: crate::speech::SpeechError) -> Self {
        match err {
            crate::speech::SpeechError::SttUnavailable(msg) => {
                CallFailure::TranscriptionUnavailable(msg)
            }
            crate::speech::SpeechError::TtsUnavailable(msg) => {
                CallFailure::SynthesisUnavailable(msg)
            }
        }
    }
}

impl From<crate::llm::LLMError> for CallFailure {
    fn from(err: crate::llm::LLMError) -> Self {
        CallFailure::ReasoningUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(CallFailure::GatewayProtocol("bad frame".into()).is_fatal());
        assert!(CallFailure::InvariantViolation("out of order".into()).is_fatal());

        assert!(!CallFailure::TranscriptionUnavailable("dropped".into()).is_fatal());
        assert!(!CallFailure::SynthesisUnavailable("500".into()).is_fatal());
        assert!(!CallFailure::ReasoningUnavailable("timeout".into()).is_fatal());
        assert!(!CallFailure::RetrievalUnavailable("store down".into()).is_fatal());
        assert!(!CallFailure::PersistenceUnavailable("store down".into()).is_fatal());
    }

    #[test]
    fn invalid_transition_message() {
        let err = CallFailure::invalid_transition("Listening", "Greeting");
        assert!(err.to_string().contains("Listening"));
        assert!(err.to_string().contains("Greeting"));
        assert!(err.is_fatal());
    }
}
