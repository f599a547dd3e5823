//! C9 Control Channel Endpoint, server side (spec.md §4.9): the `axum`
//! WebSocket upgrade handler and the per-channel frame loop.

use std::sync::Arc;

use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use tunnel_core::frame::Frame;
use tunnel_core::subdomain::is_valid_subdomain;
use tunnel_ws::{classify_axum_message, spawn_axum_writer, Inbound};

use crate::events::ServerEvent;
use crate::registry::ChannelHandle;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let channel_id = state.next_channel_id();
    let (sink, mut stream) = socket.split();
    let writer = spawn_axum_writer(sink);
    let handle = ChannelHandle::new(channel_id, writer);

    state.stats.record_connection();
    state.events.emit(ServerEvent::Connection { channel_id });
    info!(channel_id, "control channel connected");
    handle.send(Frame::Connected);

    let mut bound_subdomain: Option<String> = None;

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(channel_id, "control channel read error: {e}");
                break;
            }
        };

        match classify_axum_message(msg) {
            Inbound::Frame(Frame::Ready { subdomain }) => {
                if !is_valid_subdomain(&subdomain) {
                    handle.send(Frame::Error {
                        message: format!("invalid subdomain: {subdomain}"),
                    });
                    break;
                }
                state.registry.add(&subdomain, handle.clone());
                let url = state.public_url(&subdomain);
                bound_subdomain = Some(subdomain.clone());
                handle.send(Frame::Registered { subdomain, url });
            }
            Inbound::Frame(frame @ Frame::Response { .. }) => {
                let id = match &frame {
                    Frame::Response { id, .. } => id.clone(),
                    _ => unreachable!(),
                };
                state.pending.complete(&id, frame);
            }
            Inbound::Frame(Frame::Ping) => {
                handle.send(Frame::Pong);
            }
            Inbound::Frame(_) => {
                // registered/connected/error/pong arrive the other direction;
                // anything else unhandled here is forward-compat noise.
            }
            Inbound::Close => break,
            Inbound::Ignored => {
                debug!(channel_id, "ignored non-frame websocket message");
            }
        }
    }

    if let Some(subdomain) = bound_subdomain.take() {
        state.registry.remove(&subdomain, channel_id);
    }
    state.pending.purge(channel_id);
    handle.mark_closed();
    state.events.emit(ServerEvent::Disconnection { channel_id });
    info!(channel_id, "control channel disconnected");
}
