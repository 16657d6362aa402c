//! Speech session contracts.
//!
//! STT and TTS sessions are long-lived provider loops owned by their
//! implementations. The session surface is a pair of typed channels per
//! direction; the call session never holds a reference into provider
//! internals, and dropping a handle releases the underlying session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Telephony audio is mulaw, 8 kHz, mono.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8_000;

/// One 20 ms frame of mulaw/8 kHz audio.
pub const FRAME_BYTES: usize = 160;

/// Nominal frame pacing interval.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("speech-to-text unavailable: {0}")]
    SttUnavailable(String),

    #[error("text-to-speech unavailable: {0}")]
    TtsUnavailable(String),
}

/// A transcription hypothesis from the STT provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    /// Committed by the provider. Only finals drive the reasoning loop;
    /// interims serve barge-in detection.
    pub is_final: bool,
    pub confidence: Option<f32>,
    pub emitted_at: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn final_(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence,
            emitted_at: Utc::now(),
        }
    }
}

/// Events emitted by an STT session.
#[derive(Debug, Clone)]
pub enum SttEvent {
    /// Empty-text events are filtered at the source and never reach here.
    Transcript(TranscriptEvent),
    /// The provider dropped mid-call. Terminal for this session; the call
    /// may start a replacement session.
    Error(String),
    /// The session closed normally.
    Closed,
}

/// Commands accepted by a TTS session.
#[derive(Debug, Clone)]
pub enum TtsCommand {
    /// Synthesize and stream one utterance. Ordered FIFO with respect to
    /// other `Speak`s on the same session.
    Speak { text: String },
    /// Barge-in: abort the in-progress utterance at the next frame boundary
    /// and discard undelivered frames. Queued utterances are discarded too.
    Cancel,
    /// Release the session.
    Close,
}

/// Events emitted by a TTS session.
#[derive(Debug, Clone)]
pub enum TtsEvent {
    /// One telephony-encoded audio frame.
    Frame(Vec<u8>),
    /// Terminal signal for one completed `Speak`. A cancelled utterance
    /// emits no `Done`.
    Done,
    Error(String),
}

/// Channel surface of a live STT session.
///
/// Dropping `audio` ends the provider stream; `events` then drains and
/// yields [`SttEvent::Closed`].
pub struct SttSessionHandle {
    pub audio: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::Receiver<SttEvent>,
}

/// Channel surface of a live TTS session.
pub struct TtsSessionHandle {
    pub commands: mpsc::Sender<TtsCommand>,
    pub events: mpsc::Receiver<TtsEvent>,
}

/// Streaming speech recognition provider.
///
/// Sessions are restartable: each call returns a fresh session starting
/// from silence with no carried state.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn start_session(&self) -> Result<SttSessionHandle, SpeechError>;
}

/// Speech synthesis provider.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Voice identifier, part of the audio artifact cache key.
    fn voice_id(&self) -> &str;

    /// Start a streaming session delivering paced telephony frames.
    async fn start_session(&self) -> Result<TtsSessionHandle, SpeechError>;

    /// One-shot batch synthesis, used by the audio artifact cache.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}
