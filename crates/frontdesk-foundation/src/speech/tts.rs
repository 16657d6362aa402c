//! Speech synthesis backends and the streaming session driver.
//!
//! A [`SynthesisBackend`] turns text into one mulaw/8 kHz byte blob; the
//! [`SpeechSynthesizer`] session worker chunks that blob into paced 20 ms
//! frames, keeps `speak` requests FIFO, and honors `cancel` at the next
//! frame boundary. The default backend is Deepgram's aura voice; the
//! ElevenLabs backend is selected when its credential is configured.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use frontdesk_kernel::config::Settings;
use frontdesk_kernel::speech::{
    SpeechError, TextToSpeech, TtsCommand, TtsEvent, TtsSessionHandle, FRAME_BYTES,
    FRAME_INTERVAL, TELEPHONY_SAMPLE_RATE,
};

const DEEPGRAM_SPEAK_URL: &str = "https://api.deepgram.com/v1/speak";
const DEEPGRAM_VOICE: &str = "aura-asteria-en";

const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const ELEVENLABS_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
const ELEVENLABS_MODEL: &str = "eleven_turbo_v2";

const COMMAND_CHANNEL_CAPACITY: usize = 16;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One-shot text to telephony-encoded audio.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    fn voice_id(&self) -> &str;
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

/// Deepgram `aura` batch synthesis returning raw mulaw/8 kHz bytes.
pub struct DeepgramSynthesis {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    voice: String,
}

impl DeepgramSynthesis {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: DEEPGRAM_SPEAK_URL.to_string(),
            voice: DEEPGRAM_VOICE.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SynthesisBackend for DeepgramSynthesis {
    fn voice_id(&self) -> &str {
        &self.voice
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let url = format!(
            "{}?model={}&encoding=mulaw&sample_rate={}&container=none",
            self.endpoint, self.voice, TELEPHONY_SAMPLE_RATE
        );
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| SpeechError::TtsUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::TtsUnavailable(format!(
                "synthesis endpoint returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::TtsUnavailable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// ElevenLabs synthesis in telephony output format. Selected when the
/// premium credential is present.
pub struct ElevenLabsSynthesis {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    voice: String,
}

impl ElevenLabsSynthesis {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: ELEVENLABS_TTS_URL.to_string(),
            voice: ELEVENLABS_VOICE.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SynthesisBackend for ElevenLabsSynthesis {
    fn voice_id(&self) -> &str {
        &self.voice
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let url = format!(
            "{}/{}?output_format=ulaw_8000",
            self.endpoint, self.voice
        );
        let response = self
            .client
            .post(url)
            .header("xi-api-key", &self.api_key)
            .json(&json!({ "text": text, "model_id": ELEVENLABS_MODEL }))
            .send()
            .await
            .map_err(|e| SpeechError::TtsUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::TtsUnavailable(format!(
                "synthesis endpoint returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::TtsUnavailable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// [`TextToSpeech`] built over any [`SynthesisBackend`].
pub struct SpeechSynthesizer {
    backend: Arc<dyn SynthesisBackend>,
}

impl SpeechSynthesizer {
    pub fn new(backend: Arc<dyn SynthesisBackend>) -> Self {
        Self { backend }
    }
}

/// Pick the synthesis provider for this deployment: premium when its
/// credential is configured, the default otherwise.
pub fn synthesizer_from_settings(settings: &Settings) -> SpeechSynthesizer {
    if settings.premium_tts_enabled() {
        let key = settings.elevenlabs_api_key.clone().unwrap_or_default();
        SpeechSynthesizer::new(Arc::new(ElevenLabsSynthesis::new(key)))
    } else {
        SpeechSynthesizer::new(Arc::new(DeepgramSynthesis::new(
            settings.deepgram_api_key.clone(),
        )))
    }
}

#[async_trait]
impl TextToSpeech for SpeechSynthesizer {
    fn voice_id(&self) -> &str {
        self.backend.voice_id()
    }

    async fn start_session(&self) -> Result<TtsSessionHandle, SpeechError> {
        let (command_tx, command_rx) = mpsc::channel::<TtsCommand>(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<TtsEvent>(EVENT_CHANNEL_CAPACITY);

        let backend = self.backend.clone();
        tokio::spawn(session_worker(backend, command_rx, event_tx));

        Ok(TtsSessionHandle {
            commands: command_tx,
            events: event_rx,
        })
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        self.backend.synthesize(text).await
    }
}

/// Session worker: one utterance at a time, FIFO, frame-paced, cancel at
/// frame boundaries.
async fn session_worker(
    backend: Arc<dyn SynthesisBackend>,
    mut commands: mpsc::Receiver<TtsCommand>,
    events: mpsc::Sender<TtsEvent>,
) {
    let mut queue: VecDeque<String> = VecDeque::new();

    'session: loop {
        let command = match queue.pop_front() {
            Some(text) => TtsCommand::Speak { text },
            None => match commands.recv().await {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            TtsCommand::Speak { text } => {
                let audio = match backend.synthesize(&text).await {
                    Ok(audio) => audio,
                    Err(err) => {
                        warn!(error = %err, "synthesis failed");
                        if events.send(TtsEvent::Error(err.to_string())).await.is_err() {
                            break 'session;
                        }
                        continue;
                    }
                };

                let mut ticker = tokio::time::interval(FRAME_INTERVAL);
                let mut cancelled = false;
                for frame in audio.chunks(FRAME_BYTES) {
                    ticker.tick().await;

                    // drain control commands between frames
                    while let Ok(command) = commands.try_recv() {
                        match command {
                            TtsCommand::Cancel => {
                                debug!("utterance cancelled at frame boundary");
                                queue.clear();
                                cancelled = true;
                            }
                            TtsCommand::Close => break 'session,
                            TtsCommand::Speak { text } => queue.push_back(text),
                        }
                    }
                    if cancelled {
                        break;
                    }

                    if events.send(TtsEvent::Frame(frame.to_vec())).await.is_err() {
                        break 'session;
                    }
                }

                // a cancelled utterance emits no terminal signal
                if !cancelled && events.send(TtsEvent::Done).await.is_err() {
                    break 'session;
                }
            }
            // nothing in progress to cancel
            TtsCommand::Cancel => {}
            TtsCommand::Close => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontdesk_kernel::speech::TtsCommand;

    /// Instant backend: N frames of synthetic audio, no network.
    struct StaticBackend {
        frames: usize,
    }

    #[async_trait]
    impl SynthesisBackend for StaticBackend {
        fn voice_id(&self) -> &str {
            "static-voice"
        }
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
            if text == "fail" {
                return Err(SpeechError::TtsUnavailable("backend down".into()));
            }
            Ok(vec![0x55u8; FRAME_BYTES * self.frames])
        }
    }

    fn synthesizer(frames: usize) -> SpeechSynthesizer {
        SpeechSynthesizer::new(Arc::new(StaticBackend { frames }))
    }

    async fn drain_one_utterance(handle: &mut TtsSessionHandle) -> (usize, bool) {
        let mut frames = 0;
        let mut done = false;
        while let Some(event) = handle.events.recv().await {
            match event {
                TtsEvent::Frame(frame) => {
                    assert_eq!(frame.len(), FRAME_BYTES);
                    frames += 1;
                }
                TtsEvent::Done => {
                    done = true;
                    break;
                }
                TtsEvent::Error(err) => panic!("unexpected synthesis error: {err}"),
            }
        }
        (frames, done)
    }

    #[tokio::test(start_paused = true)]
    async fn speak_streams_paced_frames_then_done() {
        let mut handle = synthesizer(5).start_session().await.unwrap();
        handle
            .commands
            .send(TtsCommand::Speak { text: "hello".into() })
            .await
            .unwrap();

        let (frames, done) = drain_one_utterance(&mut handle).await;
        assert_eq!(frames, 5);
        assert!(done);
    }

    #[tokio::test(start_paused = true)]
    async fn speaks_are_fifo() {
        let mut handle = synthesizer(2).start_session().await.unwrap();
        handle
            .commands
            .send(TtsCommand::Speak { text: "first".into() })
            .await
            .unwrap();
        handle
            .commands
            .send(TtsCommand::Speak { text: "second".into() })
            .await
            .unwrap();

        let (frames_a, done_a) = drain_one_utterance(&mut handle).await;
        let (frames_b, done_b) = drain_one_utterance(&mut handle).await;
        assert_eq!((frames_a, frames_b), (2, 2));
        assert!(done_a && done_b);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_undelivered_frames() {
        let mut handle = synthesizer(500).start_session().await.unwrap();
        handle
            .commands
            .send(TtsCommand::Speak { text: "long reply".into() })
            .await
            .unwrap();

        // let a few frames through, then barge in
        let mut delivered = 0;
        while delivered < 3 {
            match handle.events.recv().await {
                Some(TtsEvent::Frame(_)) => delivered += 1,
                other => panic!("expected frame, got {other:?}"),
            }
        }
        handle.commands.send(TtsCommand::Cancel).await.unwrap();

        // remaining frames are bounded by the cancel taking effect at the
        // next frame boundary, and no Done is emitted for the cancelled
        // utterance; a follow-up speak still works.
        handle
            .commands
            .send(TtsCommand::Speak { text: "next".into() })
            .await
            .unwrap();

        let mut post_cancel_frames = 0;
        let mut saw_done = false;
        while let Some(event) = handle.events.recv().await {
            match event {
                TtsEvent::Frame(_) => post_cancel_frames += 1,
                TtsEvent::Done => {
                    saw_done = true;
                    break;
                }
                TtsEvent::Error(err) => panic!("unexpected error: {err}"),
            }
        }
        assert!(saw_done);
        // the 500-frame utterance was abandoned; what remains is the
        // 500-frame follow-up plus a few frames of slack already in
        // flight when the cancel landed
        assert!(
            post_cancel_frames <= 520,
            "cancel should discard the in-flight utterance, saw {post_cancel_frames} frames"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_failure_emits_error_and_keeps_session() {
        let mut handle = synthesizer(2).start_session().await.unwrap();
        handle
            .commands
            .send(TtsCommand::Speak { text: "fail".into() })
            .await
            .unwrap();

        match handle.events.recv().await {
            Some(TtsEvent::Error(_)) => {}
            other => panic!("expected error event, got {other:?}"),
        }

        // the session survives and serves the next utterance
        handle
            .commands
            .send(TtsCommand::Speak { text: "ok".into() })
            .await
            .unwrap();
        let (frames, done) = drain_one_utterance(&mut handle).await;
        assert_eq!(frames, 2);
        assert!(done);
    }

    #[tokio::test(start_paused = true)]
    async fn close_releases_the_session() {
        let mut handle = synthesizer(2).start_session().await.unwrap();
        handle.commands.send(TtsCommand::Close).await.unwrap();
        // worker exits and drops its event sender
        assert!(handle.events.recv().await.is_none());
    }

    #[test]
    fn provider_selection_follows_premium_credential() {
        let mut settings = Settings::for_tests();
        let synthesizer = synthesizer_from_settings(&settings);
        assert_eq!(synthesizer.voice_id(), DEEPGRAM_VOICE);

        settings.elevenlabs_api_key = Some("xi-key".to_string());
        let synthesizer = synthesizer_from_settings(&settings);
        assert_eq!(synthesizer.voice_id(), ELEVENLABS_VOICE);
    }
}
