//! Shared test doubles for the server integration tests.
//!
//! Every provider seam gets a deterministic, observable fake: a scripted
//! STT session the test feeds events into, a TTS session that logs its
//! commands, a scripted LLM, and a store wrapper with injectable
//! failures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use frontdesk_foundation::reasoning::driver::{ReasoningConfig, ReasoningDriver};
use frontdesk_foundation::retrieval::RetrievalEngine;
use frontdesk_foundation::store::memory::MemoryStore;
use frontdesk_kernel::call::CallRecord;
use frontdesk_kernel::config::Settings;
use frontdesk_kernel::embedding::{EmbeddingClient, EmbeddingError, EMBEDDING_DIMENSIONS};
use frontdesk_kernel::llm::{
    ChatCompletionRequest, ChatCompletionResponse, LLMError, LLMProvider, LLMResult,
};
use frontdesk_kernel::retrieval::SearchHit;
use frontdesk_kernel::speech::{
    SpeechError, SpeechToText, SttEvent, SttSessionHandle, TextToSpeech, TranscriptEvent,
    TtsCommand, TtsEvent, TtsSessionHandle,
};
use frontdesk_kernel::store::{BusinessIdentity, ContactRecord, DocumentStore, EmailRecord, StoreError};
use frontdesk_server::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings: deterministic, keyed by text length
// ─────────────────────────────────────────────────────────────────────────────

pub struct LenEmbeddings;

#[async_trait]
impl EmbeddingClient for LenEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput);
        }
        let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
        vector[text.len() % EMBEDDING_DIMENSIONS] = 1.0;
        Ok(vector)
    }
}

/// Embedding vector that [`LenEmbeddings`] produces for `text`.
pub fn embedding_for(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
    vector[text.len() % EMBEDDING_DIMENSIONS] = 1.0;
    vector
}

// ─────────────────────────────────────────────────────────────────────────────
// STT: sessions the test feeds
// ─────────────────────────────────────────────────────────────────────────────

pub struct FakeStt {
    senders: Mutex<Vec<mpsc::Sender<SttEvent>>>,
    fail_starts: AtomicUsize,
}

impl FakeStt {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(Vec::new()),
            fail_starts: AtomicUsize::new(0),
        })
    }

    /// Make the next `n` session starts fail.
    pub fn fail_next_starts(self: &Arc<Self>, n: usize) {
        self.fail_starts.store(n, Ordering::SeqCst);
    }

    pub fn sessions_started(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    /// Event sender of the most recently started session; waits for a
    /// session to exist.
    pub async fn session_sender(&self) -> mpsc::Sender<SttEvent> {
        for _ in 0..200 {
            if let Some(sender) = self.senders.lock().unwrap().last().cloned() {
                return sender;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no STT session was started");
    }

    pub async fn say_final(&self, text: &str) {
        let sender = self.session_sender().await;
        sender
            .send(SttEvent::Transcript(TranscriptEvent::final_(text, Some(0.95))))
            .await
            .expect("session should consume transcripts");
    }

    pub async fn say_interim(&self, text: &str) {
        let sender = self.session_sender().await;
        sender
            .send(SttEvent::Transcript(TranscriptEvent::interim(text)))
            .await
            .expect("session should consume transcripts");
    }

    pub async fn drop_session(&self, reason: &str) {
        let sender = self.session_sender().await;
        let _ = sender.send(SttEvent::Error(reason.to_string())).await;
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn start_session(&self) -> Result<SttSessionHandle, SpeechError> {
        let remaining = self.fail_starts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_starts.store(remaining - 1, Ordering::SeqCst);
            return Err(SpeechError::SttUnavailable("scripted start failure".into()));
        }

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(256);
        // keep the audio receiver alive so fan-in never errors
        tokio::spawn(async move { while audio_rx.recv().await.is_some() {} });

        let (event_tx, event_rx) = mpsc::channel::<SttEvent>(64);
        self.senders.lock().unwrap().push(event_tx);

        Ok(SttSessionHandle {
            audio: audio_tx,
            events: event_rx,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TTS: command-logging session
// ─────────────────────────────────────────────────────────────────────────────

pub struct FakeTts {
    pub log: Arc<Mutex<Vec<String>>>,
    frames_per_utterance: usize,
    frame_delay: Duration,
}

impl FakeTts {
    pub fn new() -> Arc<Self> {
        Self::with_frames(2, Duration::from_millis(2))
    }

    pub fn with_frames(frames_per_utterance: usize, frame_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            frames_per_utterance,
            frame_delay,
        })
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn spoke(&self, needle: &str) -> bool {
        self.commands()
            .iter()
            .any(|entry| entry.starts_with("speak:") && entry.contains(needle))
    }

    pub fn cancelled(&self) -> bool {
        self.commands().iter().any(|entry| entry == "cancel")
    }

    /// Wait until the log satisfies `predicate` or panic after ~2 s.
    pub async fn wait_for(&self, predicate: impl Fn(&[String]) -> bool) {
        for _ in 0..400 {
            if predicate(&self.commands()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("TTS log never satisfied predicate: {:?}", self.commands());
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    fn voice_id(&self) -> &str {
        "fake-voice"
    }

    async fn start_session(&self) -> Result<TtsSessionHandle, SpeechError> {
        let (command_tx, mut command_rx) = mpsc::channel::<TtsCommand>(16);
        let (event_tx, event_rx) = mpsc::channel::<TtsEvent>(512);
        let log = self.log.clone();
        let frames = self.frames_per_utterance;
        let delay = self.frame_delay;

        tokio::spawn(async move {
            let mut queue: VecDeque<String> = VecDeque::new();
            'session: loop {
                let command = match queue.pop_front() {
                    Some(text) => TtsCommand::Speak { text },
                    None => match command_rx.recv().await {
                        Some(command) => command,
                        None => break,
                    },
                };

                match command {
                    TtsCommand::Speak { text } => {
                        log.lock().unwrap().push(format!("speak:{text}"));
                        let mut cancelled = false;
                        for _ in 0..frames {
                            tokio::time::sleep(delay).await;
                            while let Ok(command) = command_rx.try_recv() {
                                match command {
                                    TtsCommand::Cancel => {
                                        log.lock().unwrap().push("cancel".to_string());
                                        queue.clear();
                                        cancelled = true;
                                    }
                                    TtsCommand::Close => {
                                        log.lock().unwrap().push("close".to_string());
                                        break 'session;
                                    }
                                    TtsCommand::Speak { text } => queue.push_back(text),
                                }
                            }
                            if cancelled {
                                break;
                            }
                            if event_tx.send(TtsEvent::Frame(vec![0u8; 160])).await.is_err() {
                                break 'session;
                            }
                        }
                        if !cancelled && event_tx.send(TtsEvent::Done).await.is_err() {
                            break 'session;
                        }
                    }
                    TtsCommand::Cancel => {
                        log.lock().unwrap().push("cancel".to_string());
                    }
                    TtsCommand::Close => {
                        log.lock().unwrap().push("close".to_string());
                        break;
                    }
                }
            }
        });

        Ok(TtsSessionHandle {
            commands: command_tx,
            events: event_rx,
        })
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        Ok(text.as_bytes().to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM: scripted provider
// ─────────────────────────────────────────────────────────────────────────────

pub enum LlmStep {
    Respond(ChatCompletionResponse),
    Fail(LLMError),
    Hang,
}

pub struct ScriptedLlm {
    steps: Mutex<VecDeque<LlmStep>>,
    pub calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(steps: Vec<LlmStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn chat(&self, _: ChatCompletionRequest) -> LLMResult<ChatCompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(LlmStep::Respond(response)) => Ok(response),
            Some(LlmStep::Fail(err)) => Err(err),
            Some(LlmStep::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(LLMError::Transport("script exhausted".into())),
        }
    }
}

pub fn content_response(content: &str) -> ChatCompletionResponse {
    serde_json::from_value(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
    .unwrap()
}

pub fn tool_response(name: &str, arguments: serde_json::Value) -> ChatCompletionResponse {
    serde_json::from_value(json!({
        "choices": [{"message": {
            "role": "assistant",
            "tool_calls": [{
                "id": "call_0",
                "type": "function",
                "function": {"name": name, "arguments": arguments.to_string()}
            }]
        }}]
    }))
    .unwrap()
}

pub fn reply_response(reply: &str) -> ChatCompletionResponse {
    tool_response("generate_response", json!({ "reply": reply }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Store with injectable failures
// ─────────────────────────────────────────────────────────────────────────────

pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    pub fail_vector_search: AtomicBool,
    pub persist_failures_remaining: AtomicUsize,
    pub persist_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryStore::new()),
            fail_vector_search: AtomicBool::new(false),
            persist_failures_remaining: AtomicUsize::new(0),
            persist_attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn upsert_email(&self, email: EmailRecord) -> Result<(), StoreError> {
        self.inner.upsert_email(email).await
    }
    async fn upsert_contact(&self, contact: ContactRecord) -> Result<(), StoreError> {
        self.inner.upsert_contact(contact).await
    }
    async fn delete_email(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_email(id).await
    }
    async fn delete_contact(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_contact(id).await
    }
    async fn find_email(&self, id: &str) -> Result<Option<EmailRecord>, StoreError> {
        self.inner.find_email(id).await
    }
    async fn find_contact(&self, id: &str) -> Result<Option<ContactRecord>, StoreError> {
        self.inner.find_contact(id).await
    }
    async fn list_emails(&self, limit: usize, skip: usize) -> Result<Vec<EmailRecord>, StoreError> {
        self.inner.list_emails(limit, skip).await
    }
    async fn list_contacts(
        &self,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<ContactRecord>, StoreError> {
        self.inner.list_contacts(limit, skip).await
    }
    async fn vector_search_emails(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if self.fail_vector_search.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("vector index offline".into()));
        }
        self.inner.vector_search_emails(query, k).await
    }
    async fn name_search_contacts(
        &self,
        name: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.inner.name_search_contacts(name, k).await
    }
    async fn persist_call(&self, record: CallRecord) -> Result<(), StoreError> {
        self.persist_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.persist_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.persist_failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("write path offline".into()));
        }
        self.inner.persist_call(record).await
    }
    async fn find_call(&self, call_sid: &str) -> Result<Option<CallRecord>, StoreError> {
        self.inner.find_call(call_sid).await
    }
    async fn list_calls(&self, limit: usize, skip: usize) -> Result<Vec<CallRecord>, StoreError> {
        self.inner.list_calls(limit, skip).await
    }
    async fn load_business_identity(&self) -> Result<Option<BusinessIdentity>, StoreError> {
        self.inner.load_business_identity().await
    }
    async fn save_business_identity(&self, identity: BusinessIdentity) -> Result<(), StoreError> {
        self.inner.save_business_identity(identity).await
    }
    async fn count_emails(&self) -> Result<usize, StoreError> {
        self.inner.count_emails().await
    }
    async fn count_contacts(&self) -> Result<usize, StoreError> {
        self.inner.count_contacts().await
    }
    async fn count_calls_since(&self, since: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.count_calls_since(since).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State assembly
// ─────────────────────────────────────────────────────────────────────────────

pub struct TestDeps {
    pub store: Arc<FlakyStore>,
    pub stt: Arc<FakeStt>,
    pub tts: Arc<FakeTts>,
    pub llm: Arc<ScriptedLlm>,
}

/// Build an `AppState` over the fakes. `settings` controls the timeout
/// table; `reasoning` tunables come from `reasoning_config`.
pub fn test_state(
    settings: Settings,
    reasoning_config: ReasoningConfig,
    deps: &TestDeps,
) -> Arc<AppState> {
    let store: Arc<dyn DocumentStore> = deps.store.clone();
    let retrieval = Arc::new(RetrievalEngine::new(store.clone(), Arc::new(LenEmbeddings)));
    let reasoning = Arc::new(ReasoningDriver::new(
        deps.llm.clone(),
        retrieval.clone(),
        reasoning_config,
    ));
    Arc::new(AppState::new(
        settings,
        store,
        retrieval,
        reasoning,
        deps.stt.clone(),
        deps.tts.clone(),
    ))
}

/// Seed the canonical known-caller fixtures: Sarah Chen and her Q2
/// Proposal email, embedded to match the "Q2 proposal" query under
/// [`LenEmbeddings`].
pub async fn seed_sarah(store: &MemoryStore) {
    store
        .upsert_contact(
            ContactRecord::new("C1", "Sarah Chen", "sarah@acme.example").with_company("Acme"),
        )
        .await
        .unwrap();

    let mut email = EmailRecord::new(
        "E1",
        "sarah@acme.example",
        "Q2 Proposal",
        "please review by Friday",
        Utc::now(),
    );
    email.embedding = Some(embedding_for("Q2 proposal"));
    store.upsert_email(email).await.unwrap();
}
