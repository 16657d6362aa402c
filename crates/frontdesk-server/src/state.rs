//! Shared application state.
//!
//! Provider handles are constructed once at startup from [`Settings`] and
//! passed by reference; nothing here is a global. Tests build an
//! `AppState` over fakes for any seam.

use std::sync::Arc;

use frontdesk_foundation::audio_cache::AudioArtifactCache;
use frontdesk_foundation::ingest::DataIngestion;
use frontdesk_foundation::reasoning::driver::ReasoningDriver;
use frontdesk_foundation::retrieval::RetrievalEngine;
use frontdesk_kernel::config::Settings;
use frontdesk_kernel::speech::{SpeechToText, TextToSpeech};
use frontdesk_kernel::store::DocumentStore;

use crate::call::registry::CallRegistry;

pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn DocumentStore>,
    pub retrieval: Arc<RetrievalEngine>,
    pub reasoning: Arc<ReasoningDriver>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub audio_cache: Arc<AudioArtifactCache>,
    pub ingestion: Arc<DataIngestion>,
    pub calls: CallRegistry,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn DocumentStore>,
        retrieval: Arc<RetrievalEngine>,
        reasoning: Arc<ReasoningDriver>,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
    ) -> Self {
        let audio_cache = Arc::new(AudioArtifactCache::new(tts.clone()));
        // ingestion shares the retrieval engine's embedding client
        let ingestion = Arc::new(DataIngestion::new(store.clone(), retrieval.embeddings()));
        Self {
            settings,
            store,
            retrieval,
            reasoning,
            stt,
            tts,
            audio_cache,
            ingestion,
            calls: CallRegistry::new(),
        }
    }
}
