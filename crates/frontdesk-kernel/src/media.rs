//! Telephony media stream events.
//!
//! The gateway speaks JSON frames over a websocket:
//!
//! ```json
//! {"event": "connected"}
//! {"event": "start", "start": {"streamSid": "...", "callSid": "...", "customParameters": {...}}}
//! {"event": "media", "media": {"payload": "<base64 mulaw>"}}
//! {"event": "stop"}
//! ```
//!
//! Inbound frames are decoded into [`MediaEvent`] values with the base64
//! payload already expanded to raw bytes; outbound audio is re-encoded with
//! [`encode_outbound`]. Field names are part of the gateway contract and
//! must not change.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Custom parameter carrying the caller's phone number, attached by the
/// inbound-call webhook.
pub const CALLER_PHONE_PARAM: &str = "caller_phone";

#[derive(Debug, Error)]
pub enum MediaProtocolError {
    #[error("malformed gateway frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid media payload: {0}")]
    Payload(#[from] base64::DecodeError),
}

/// Wire representation of one inbound gateway frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum WireFrame {
    Connected,
    Start { start: WireStart },
    Media { media: WirePayload },
    Stop,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStart {
    stream_sid: String,
    call_sid: String,
    #[serde(default)]
    custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    payload: String,
}

/// Wire representation of one outbound media frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireOutbound<'a> {
    event: &'static str,
    stream_sid: &'a str,
    media: WireOutboundPayload,
}

#[derive(Debug, Serialize)]
struct WireOutboundPayload {
    payload: String,
}

/// Identifiers announced by the gateway's `start` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStart {
    pub stream_sid: String,
    pub call_sid: String,
    pub custom_parameters: HashMap<String, String>,
}

impl StreamStart {
    /// Caller number attached by the webhook, when present.
    pub fn caller_number(&self) -> Option<&str> {
        self.custom_parameters
            .get(CALLER_PHONE_PARAM)
            .map(String::as_str)
    }
}

/// Decoded gateway event delivered to the call session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Connected,
    StreamStart(StreamStart),
    /// ~20 ms of mulaw/8 kHz audio, already base64-decoded.
    AudioFrame(Vec<u8>),
    StreamStop,
}

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<MediaEvent, MediaProtocolError> {
    let frame: WireFrame = serde_json::from_str(text)?;
    let event = match frame {
        WireFrame::Connected => MediaEvent::Connected,
        WireFrame::Start { start } => MediaEvent::StreamStart(StreamStart {
            stream_sid: start.stream_sid,
            call_sid: start.call_sid,
            custom_parameters: start.custom_parameters,
        }),
        WireFrame::Media { media } => MediaEvent::AudioFrame(BASE64.decode(media.payload)?),
        WireFrame::Stop => MediaEvent::StreamStop,
    };
    Ok(event)
}

/// Encode an outbound audio frame for the gateway.
pub fn encode_outbound(stream_sid: &str, audio: &[u8]) -> String {
    let frame = WireOutbound {
        event: "media",
        stream_sid,
        media: WireOutboundPayload {
            payload: BASE64.encode(audio),
        },
    };
    // Serialization of this shape cannot fail: strings and a struct of
    // strings only.
    serde_json::to_string(&frame).unwrap_or_default()
}
