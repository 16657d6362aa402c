//! Provider implementations and the mid-layer engines of the frontdesk
//! reception agent: the in-memory document store, the embedding client,
//! the retrieval engine, ingestion, the reasoning driver, speech sessions
//! and the audio artifact cache.
//!
//! Everything here implements a seam declared in `frontdesk-kernel`; the
//! server layer wires concrete instances together at startup and tests
//! substitute fakes per seam.

pub mod audio_cache;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod reasoning;
pub mod retrieval;
pub mod speech;
pub mod store;

pub use audio_cache::{AudioArtifactCache, AUDIO_CACHE_CAPACITY};
pub use embedding::VoyageEmbeddings;
pub use ingest::{DataIngestion, IngestError, IngestReport};
pub use llm::fireworks::{FireworksConfig, FireworksProvider};
pub use reasoning::driver::{ReasoningConfig, ReasoningDriver, TurnOutcome, FALLBACK_REPLY};
pub use reasoning::extract::{extract_caller_info, CallerInfo};
pub use reasoning::outcome::outcome_for;
pub use retrieval::RetrievalEngine;
pub use speech::stt::DeepgramStt;
pub use speech::tts::{
    synthesizer_from_settings, DeepgramSynthesis, ElevenLabsSynthesis, SpeechSynthesizer,
    SynthesisBackend,
};
pub use store::memory::MemoryStore;
