//! Audio artifact serving.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::state::AppState;

/// `GET /tts/{id}`: serve a cached artifact. Identifiers are opaque and
/// expire on eviction; expired ones are plain 404s.
pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path(artifact_id): Path<String>,
) -> Response {
    match state.audio_cache.get(&artifact_id).await {
        Some(audio) => (
            StatusCode::OK,
            [
                // raw mulaw/8 kHz mono
                (header::CONTENT_TYPE, "audio/basic".to_string()),
                (
                    header::CACHE_CONTROL,
                    "public, max-age=3600".to_string(),
                ),
            ],
            audio.as_ref().clone(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "audio not found").into_response(),
    }
}
