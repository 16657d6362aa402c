//! Deepgram streaming speech-to-text session.
//!
//! Each session opens one provider websocket. A send loop forwards mulaw
//! audio frames from the session's audio channel; a receive loop parses
//! result frames into transcript events. Closing the audio channel sends
//! the provider's close message and drains the socket; a provider drop
//! mid-call emits a terminal [`SttEvent::Error`] so the call can start a
//! replacement session.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use frontdesk_kernel::speech::{
    SpeechError, SpeechToText, SttEvent, SttSessionHandle, TranscriptEvent,
    TELEPHONY_SAMPLE_RATE,
};

const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";
const STT_MODEL: &str = "nova-2";

const AUDIO_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result frame subset we consume from the provider.
#[derive(Debug, Deserialize)]
struct ListenFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_final: Option<bool>,
    #[serde(default)]
    channel: Option<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Parse one provider text frame into a transcript event.
///
/// Empty transcripts are filtered here, at the source; non-result frames
/// (metadata, utterance markers) yield `None`.
pub(crate) fn parse_listen_frame(text: &str) -> Option<TranscriptEvent> {
    let frame: ListenFrame = serde_json::from_str(text).ok()?;
    if frame.kind.as_deref() != Some("Results") {
        return None;
    }
    let alternative = frame.channel?.alternatives.into_iter().next()?;
    let transcript = alternative.transcript.trim();
    if transcript.is_empty() {
        return None;
    }
    Some(if frame.is_final.unwrap_or(false) {
        TranscriptEvent::final_(transcript, alternative.confidence)
    } else {
        TranscriptEvent::interim(transcript)
    })
}

/// Streaming STT backed by the Deepgram listen endpoint.
pub struct DeepgramStt {
    api_key: String,
    endpoint: String,
}

impl DeepgramStt {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEEPGRAM_LISTEN_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn session_url(&self) -> String {
        format!(
            "{}?model={}&language=en-US&encoding=mulaw&sample_rate={}&smart_format=true&interim_results=true&vad_events=true",
            self.endpoint, STT_MODEL, TELEPHONY_SAMPLE_RATE
        )
    }
}

#[async_trait::async_trait]
impl SpeechToText for DeepgramStt {
    async fn start_session(&self) -> Result<SttSessionHandle, SpeechError> {
        let mut request = self
            .session_url()
            .into_client_request()
            .map_err(|e| SpeechError::SttUnavailable(e.to_string()))?;
        let auth = format!("Token {}", self.api_key)
            .parse()
            .map_err(|_| SpeechError::SttUnavailable("invalid api key header".to_string()))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SpeechError::SttUnavailable(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<SttEvent>(EVENT_CHANNEL_CAPACITY);

        // Send loop: audio frames out, then the provider's close message
        // once the session's audio channel is dropped.
        tokio::spawn(async move {
            while let Some(frame) = audio_rx.recv().await {
                if sink.send(Message::Binary(frame)).await.is_err() {
                    break;
                }
            }
            let close = json!({"type": "CloseStream"}).to_string();
            let _ = sink.send(Message::Text(close)).await;
            let _ = sink.close().await;
        });

        // Receive loop: provider frames in, transcript events out.
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_listen_frame(&text) {
                            if event_tx.send(SttEvent::Transcript(event)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "transcription socket failed");
                        let _ = event_tx.send(SttEvent::Error(err.to_string())).await;
                        return;
                    }
                }
            }
            debug!("transcription session closed");
            let _ = event_tx.send(SttEvent::Closed).await;
        });

        Ok(SttSessionHandle {
            audio: audio_tx,
            events: event_rx,
        })
    }
}
