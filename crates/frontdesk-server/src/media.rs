//! Telephony media stream endpoint.
//!
//! Accepts the gateway's websocket, decodes its JSON frames into typed
//! [`MediaEvent`]s for the call session, and encodes the session's
//! outbound audio back into gateway media frames. The socket is closed on
//! every exit path; malformed frames are protocol violations that end the
//! call.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use frontdesk_kernel::error::CallFailure;
use frontdesk_kernel::media::{decode_frame, encode_outbound, MediaEvent, StreamStart};

use crate::call::CallSession;
use crate::state::AppState;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

pub async fn media_stream(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_media_socket(state, socket))
}

async fn handle_media_socket(state: Arc<AppState>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    // The gateway leads with `connected` then `start`; nothing else is
    // valid before the stream identifiers arrive.
    let start: StreamStart = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                Ok(MediaEvent::Connected) => continue,
                Ok(MediaEvent::StreamStart(start)) => break start,
                Ok(MediaEvent::StreamStop) => {
                    let _ = sink.close().await;
                    return;
                }
                Ok(MediaEvent::AudioFrame(_)) => {
                    warn!("gateway sent media before start");
                    let _ = sink.close().await;
                    return;
                }
                Err(err) => {
                    let failure = CallFailure::GatewayProtocol(err.to_string());
                    warn!(error = %failure, "handshake rejected");
                    let _ = sink.close().await;
                    return;
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                let _ = sink.close().await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                warn!(error = %err, "websocket failed during handshake");
                let _ = sink.close().await;
                return;
            }
        }
    };

    info!(
        call_sid = %start.call_sid,
        stream_sid = %start.stream_sid,
        "media stream started"
    );

    // The inbound webhook usually registered the caller already; fall
    // back to the stream's custom parameter for direct connections.
    let caller_number = match state.calls.get(&start.call_sid).await {
        Some(active) => active.caller_number,
        None => start.caller_number().unwrap_or_default().to_string(),
    };
    let cancel = state.calls.register(&start.call_sid, &caller_number).await;

    let (event_tx, event_rx) = mpsc::channel::<MediaEvent>(EVENT_CHANNEL_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_CHANNEL_CAPACITY);

    let session = CallSession::new(
        state.clone(),
        start.call_sid.clone(),
        caller_number.clone(),
        cancel,
    );
    let session_task = tokio::spawn(session.run(event_rx, outbound_tx));

    let stream_sid = start.stream_sid.clone();
    let outbound_task = tokio::spawn(async move {
        while let Some(audio) = outbound_rx.recv().await {
            let frame = encode_outbound(&stream_sid, &audio);
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match decode_frame(&text) {
                Ok(event @ MediaEvent::AudioFrame(_)) => {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(MediaEvent::StreamStop) => {
                    let _ = event_tx.send(MediaEvent::StreamStop).await;
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    let failure = CallFailure::GatewayProtocol(err.to_string());
                    warn!(error = %failure, "ending call");
                    let _ = event_tx.send(MediaEvent::StreamStop).await;
                    break;
                }
            },
            Ok(Message::Close(_)) => {
                debug!("gateway closed the websocket");
                let _ = event_tx.send(MediaEvent::StreamStop).await;
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "websocket error, ending call");
                let _ = event_tx.send(MediaEvent::StreamStop).await;
                break;
            }
        }
    }

    // closing the event channel ends the session even if no stop frame
    // was delivered
    drop(event_tx);
    let _ = session_task.await;
    let _ = outbound_task.await;
    info!(call_sid = %start.call_sid, "media stream closed");
}
