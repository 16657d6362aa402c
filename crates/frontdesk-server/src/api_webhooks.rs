//! Telephony webhooks: inbound call and call-status updates.

use axum::extract::{Form, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use frontdesk_kernel::call::CallOutcome;
use frontdesk_kernel::media::CALLER_PHONE_PARAM;

use crate::state::AppState;
use crate::twiml::TwimlResponse;

#[derive(Debug, Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: String,
}

#[derive(Debug, Deserialize)]
pub struct CallStatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
    #[serde(rename = "CallDuration", default)]
    pub call_duration: Option<u64>,
}

/// Derive the media-stream websocket URL from the public base URL.
fn media_url(base_url: &str) -> String {
    let wss = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    };
    format!("{}/media", wss.trim_end_matches('/'))
}

fn xml_response(twiml: TwimlResponse) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        twiml.to_xml(),
    )
        .into_response()
}

/// `POST /incoming-call`: register the call and answer with markup that
/// connects the media stream. When the greeting artifact is available it
/// is referenced as a pull URL so the caller hears something while the
/// stream connects.
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    Form(form): Form<IncomingCallForm>,
) -> Response {
    info!(
        call_sid = %form.call_sid,
        from = %form.from,
        to = %form.to,
        status = %form.call_status,
        "incoming call"
    );

    state.calls.register(&form.call_sid, &form.from).await;

    let mut twiml = TwimlResponse::new();
    match state
        .audio_cache
        .get_or_synthesize(&state.settings.greeting)
        .await
    {
        Ok((artifact_id, _)) if !state.settings.base_url.is_empty() => {
            let url = format!(
                "{}/tts/{}",
                state.settings.base_url.trim_end_matches('/'),
                artifact_id
            );
            twiml = twiml.play(&url);
        }
        Ok(_) => {}
        Err(err) => {
            // fall back to the gateway's native voice for the greeting
            warn!(error = %err, "greeting synthesis failed, using gateway voice");
            twiml = twiml.say(&state.settings.greeting);
        }
    }

    let twiml = twiml.connect_stream(
        &media_url(&state.settings.base_url),
        &[(CALLER_PHONE_PARAM, &form.from)],
    );
    xml_response(twiml)
}

/// Map a terminal gateway status onto the stored outcome. `completed`
/// keeps whatever the session's analysis decided (upgrading only a record
/// still marked in-progress); the failure statuses all read as missed.
fn outcome_for_status(status: &str, stored: CallOutcome) -> Option<CallOutcome> {
    match status {
        "completed" => {
            if stored == CallOutcome::InProgress {
                Some(CallOutcome::Connected)
            } else {
                None
            }
        }
        "busy" | "no-answer" | "failed" | "canceled" => Some(CallOutcome::Missed),
        _ => None,
    }
}

const TERMINAL_STATUSES: &[&str] = &["completed", "failed", "busy", "no-answer", "canceled"];

/// `POST /call-status`: terminal statuses cancel any still-active session
/// and update the stored record's outcome fields.
pub async fn call_status(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CallStatusForm>,
) -> Response {
    info!(
        call_sid = %form.call_sid,
        status = %form.call_status,
        duration = ?form.call_duration,
        "call status update"
    );

    if !TERMINAL_STATUSES.contains(&form.call_status.as_str()) {
        return Json(json!({"status": "ok"})).into_response();
    }

    if let Some(active) = state.calls.get(&form.call_sid).await {
        active.cancel.trigger();
    }

    match state.store.find_call(&form.call_sid).await {
        Ok(Some(mut record)) => {
            if let Some(outcome) = outcome_for_status(&form.call_status, record.outcome) {
                record.outcome = outcome;
            }
            if record.ended_at.is_none() {
                record.ended_at = Some(chrono::Utc::now());
            }
            if let Err(err) = state.store.persist_call(record).await {
                warn!(error = %err, "failed to update call outcome");
            }
        }
        Ok(None) => {
            // the session may still be finalizing; it persists its own
            // record with the analyzed outcome
        }
        Err(err) => warn!(error = %err, "failed to load call record for status update"),
    }

    Json(json!({"status": "ok"})).into_response()
}
