//! HTTP/websocket surface and per-call orchestration.
//!
//! The server exposes the telephony webhooks, the bidirectional media
//! websocket, the audio artifact URL and the thin admin contract. Each
//! connected call runs as one [`call::CallSession`] task that owns the
//! call's state exclusively and talks to every provider through the seams
//! wired into [`state::AppState`].

pub mod api_admin;
pub mod api_audio;
pub mod api_webhooks;
pub mod call;
pub mod media;
pub mod server;
pub mod state;
pub mod twiml;

pub use server::{ReceptionServer, ServerConfig};
pub use state::AppState;
