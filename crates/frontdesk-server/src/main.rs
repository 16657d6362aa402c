use std::sync::Arc;

use frontdesk_foundation::embedding::VoyageEmbeddings;
use frontdesk_foundation::llm::fireworks::{FireworksConfig, FireworksProvider};
use frontdesk_foundation::reasoning::driver::{ReasoningConfig, ReasoningDriver};
use frontdesk_foundation::retrieval::RetrievalEngine;
use frontdesk_foundation::speech::stt::DeepgramStt;
use frontdesk_foundation::speech::tts::synthesizer_from_settings;
use frontdesk_foundation::store::memory::MemoryStore;
use frontdesk_kernel::config::Settings;
use frontdesk_server::{AppState, ReceptionServer, ServerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "frontdesk=info,tower_http=info".into()),
        )
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let store = Arc::new(MemoryStore::new());
    let embeddings = Arc::new(VoyageEmbeddings::new(settings.voyage_api_key.clone()));
    let retrieval = Arc::new(RetrievalEngine::new(store.clone(), embeddings));

    let provider = Arc::new(FireworksProvider::new(FireworksConfig::new(
        settings.fireworks_api_key.clone(),
        settings.reasoning_model.clone(),
    )));
    let reasoning_config = ReasoningConfig {
        model: settings.reasoning_model.clone(),
        turn_timeout: settings.timeouts.model_turn,
        tool_timeout: settings.timeouts.tool_call,
        retry_backoff: settings.timeouts.model_retry_backoff,
        ..Default::default()
    };
    let reasoning = Arc::new(ReasoningDriver::new(
        provider,
        retrieval.clone(),
        reasoning_config,
    ));

    let stt = Arc::new(DeepgramStt::new(settings.deepgram_api_key.clone()));
    let tts = Arc::new(synthesizer_from_settings(&settings));

    let server_config = ServerConfig::new()
        .with_host(settings.server_host.clone())
        .with_port(settings.server_port);

    let state = Arc::new(AppState::new(
        settings, store, retrieval, reasoning, stt, tts,
    ));

    if let Err(err) = ReceptionServer::new(server_config, state).start().await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
