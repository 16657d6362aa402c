//! Core contracts for the frontdesk reception agent.
//!
//! This crate defines the types and traits every other layer builds on:
//! the call state machine and record types, the telephony media event set,
//! the speech session contracts, the document store and embedding seams,
//! the LLM provider interface, and the shared failure taxonomy.
//!
//! Nothing in this crate performs I/O. Provider implementations live in
//! `frontdesk-foundation`; the HTTP/WS surface and the per-call
//! orchestration live in `frontdesk-server`.

pub mod call;
pub mod config;
pub mod embedding;
pub mod error;
pub mod interrupt;
pub mod llm;
pub mod media;
pub mod retrieval;
pub mod speech;
pub mod store;

pub use call::{
    CallAnalysis, CallOutcome, CallPhase, CallRecord, Decision, Speaker, TranscriptEntry,
};
pub use config::{ConfigError, Settings, Timeouts};
pub use embedding::{EmbeddingClient, EmbeddingError, EMBEDDING_DIMENSIONS};
pub use error::{CallFailure, CallResult};
pub use interrupt::CancelHandle;
pub use llm::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice, FunctionCall,
    FunctionDef, LLMError, LLMProvider, LLMResult, ResponseFormat, Role, Tool, ToolCall,
};
pub use media::{MediaEvent, MediaProtocolError, StreamStart};
pub use retrieval::{
    CallerContext, Retrieved, SearchHit, MAX_CONTACT_HITS, MAX_EMAIL_HITS,
};
pub use speech::{
    SpeechError, SpeechToText, SttEvent, SttSessionHandle, TextToSpeech, TranscriptEvent,
    TtsCommand, TtsEvent, TtsSessionHandle, FRAME_BYTES, FRAME_INTERVAL,
    TELEPHONY_SAMPLE_RATE,
};
pub use store::{
    BusinessIdentity, ContactRecord, DocumentStore, EmailRecord, StoreError,
};
