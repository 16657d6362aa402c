//! Process configuration, loaded once at startup from the environment and
//! immutable afterwards.

use std::time::Duration;
use thiserror::Error;

/// Default greeting spoken when a call connects.
pub const DEFAULT_GREETING: &str =
    "Hello, this is Donna, your AI assistant. How may I help you today?";

/// Default reasoning model served by the Fireworks endpoint.
pub const DEFAULT_REASONING_MODEL: &str = "accounts/fireworks/models/minimax-m2p1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVariable(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Timeout and limit table for the call pipeline.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Budget for one reasoning turn, including tool round-trips.
    pub model_turn: Duration,
    /// Budget for a single retrieval tool call.
    pub tool_call: Duration,
    /// Gap between STT finals while listening before a re-prompt.
    pub silence: Duration,
    /// No inbound audio at all before the call is torn down.
    pub call_idle: Duration,
    /// Grace given to collaborators at teardown before proceeding anyway.
    pub shutdown_grace: Duration,
    /// Backoff before the single reasoning retry.
    pub model_retry_backoff: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            model_turn: Duration::from_secs(8),
            tool_call: Duration::from_secs(3),
            silence: Duration::from_secs(6),
            call_idle: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
            model_retry_backoff: Duration::from_millis(250),
        }
    }
}

/// All external-service credentials and tunables.
///
/// The telephony gateway only calls in (webhooks and the media stream);
/// no outbound gateway API is used, so no telephony credential is
/// required here.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Connection string of an external document store. Absent selects
    /// the in-process store, which needs no connection string.
    pub store_uri: Option<String>,
    /// Embedding provider credential.
    pub voyage_api_key: String,
    /// Streaming STT / default TTS credential.
    pub deepgram_api_key: String,
    /// Premium TTS credential; when present the premium synthesis provider
    /// is selected instead of the default.
    pub elevenlabs_api_key: Option<String>,
    /// Reasoning endpoint credential.
    pub fireworks_api_key: String,
    /// Public base URL used to build audio-artifact pull URLs.
    pub base_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub greeting: String,
    pub reasoning_model: String,
    pub timeouts: Timeouts,
}

impl Settings {
    /// Load settings from the environment. Required variables produce a
    /// named error when missing; optional ones fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_port = match std::env::var("SERVER_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "SERVER_PORT",
                value: raw,
            })?,
            Err(_) => 8000,
        };

        Ok(Self {
            store_uri: optional("MONGODB_URI"),
            voyage_api_key: required("VOYAGE_API_KEY")?,
            deepgram_api_key: required("DEEPGRAM_API_KEY")?,
            elevenlabs_api_key: optional("ELEVENLABS_API_KEY"),
            fireworks_api_key: required("FIREWORKS_API_KEY")?,
            base_url: std::env::var("BASE_URL").unwrap_or_default(),
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port,
            greeting: std::env::var("GREETING").unwrap_or_else(|_| DEFAULT_GREETING.to_string()),
            reasoning_model: std::env::var("FIREWORKS_MODEL")
                .unwrap_or_else(|_| DEFAULT_REASONING_MODEL.to_string()),
            timeouts: Timeouts::default(),
        })
    }

    /// Whether the premium TTS provider should be used.
    pub fn premium_tts_enabled(&self) -> bool {
        self.elevenlabs_api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }

    /// Construction hook for tests: everything defaulted, no environment
    /// access.
    pub fn for_tests() -> Self {
        Self {
            store_uri: None,
            voyage_api_key: "test-voyage".to_string(),
            deepgram_api_key: "test-deepgram".to_string(),
            elevenlabs_api_key: None,
            fireworks_api_key: "test-fireworks".to_string(),
            base_url: "https://frontdesk.test".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            greeting: DEFAULT_GREETING.to_string(),
            reasoning_model: "test-model".to_string(),
            timeouts: Timeouts::default(),
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingVariable(name))
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
