//! C5 Client State Machine (spec.md §4.5): dial, register, heartbeat,
//! dispatch, reconnect, teardown.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tunnel_core::backoff::calculate_backoff;
use tunnel_core::config::ClientSettings;
use tunnel_core::frame::Frame;
use tunnel_ws::{classify_tungstenite_message, spawn_tungstenite_writer, FrameWriter, Inbound};

use crate::events::{ClientEvent, EventBus};
use crate::fetcher::LocalFetcher;
use crate::state::ClientState;

/// How many missed heartbeat periods without any inbound frame before the
/// client proactively closes the channel (spec.md §5, §9 open question b).
const HALF_OPEN_MULTIPLIER: u32 = 2;

pub struct TunnelClient {
    settings: ClientSettings,
    events: EventBus,
    state: Mutex<ClientState>,
    registered_url: Mutex<Option<String>>,
    attempts: AtomicU32,
    shutdown: CancellationToken,
}

impl TunnelClient {
    pub fn new(settings: ClientSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            events: EventBus::new(),
            state: Mutex::new(ClientState::Disconnected),
            registered_url: Mutex::new(None),
            attempts: AtomicU32::new(0),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock().unwrap()
    }

    pub fn registered_url(&self) -> Option<String> {
        self.registered_url.lock().unwrap().clone()
    }

    /// `shouldReconnect := false`; cancels the heartbeat and any pending
    /// reconnect sleep, and closes the current channel. Idempotent.
    pub fn disconnect(&self) {
        self.shutdown.cancel();
    }

    fn set_state(&self, state: ClientState) {
        *self.state.lock().unwrap() = state;
    }

    /// Run the connect/reconnect loop until `disconnect()` is called or
    /// the reconnect-attempt budget is exhausted.
    pub async fn run(self: Arc<Self>) -> color_eyre::Result<()> {
        let fetcher = Arc::new(LocalFetcher::new(
            self.settings.local_host.clone(),
            self.settings.local_port,
            self.settings.request_timeout(),
            self.settings.max_body_bytes,
        ));
        let subdomain = self.settings.subdomain.clone().unwrap_or_default();

        loop {
            if self.shutdown.is_cancelled() {
                self.set_state(ClientState::Disconnected);
                return Ok(());
            }

            self.set_state(ClientState::Connecting);
            match self.connect_and_run(&subdomain, &fetcher).await {
                Ok(()) => {
                    self.events.emit(ClientEvent::Disconnected);
                }
                Err(e) => {
                    warn!("tunnel connection error: {e}");
                    self.set_state(ClientState::Error);
                    self.events.emit(ClientEvent::Error { message: e.to_string() });
                }
            }

            if self.shutdown.is_cancelled() {
                self.set_state(ClientState::Disconnected);
                return Ok(());
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.settings.max_reconnect_attempts {
                self.set_state(ClientState::Disconnected);
                return Ok(());
            }

            let delay = calculate_backoff(attempt);
            self.set_state(ClientState::Reconnecting);
            self.events.emit(ClientEvent::Reconnecting {
                attempt,
                delay_ms: delay.as_millis() as u64,
            });
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    self.set_state(ClientState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    /// One connect → ready → heartbeat/dispatch cycle. Returns once the
    /// channel closes (peer close, half-open timeout, or shutdown).
    async fn connect_and_run(
        &self,
        subdomain: &str,
        fetcher: &Arc<LocalFetcher>,
    ) -> color_eyre::Result<()> {
        let url = format!("{}/?subdomain={}", self.settings.edge_ws_base_url(), subdomain);
        let request = url.clone().into_client_request()?;

        let (ws_stream, _response) = timeout(
            self.settings.connect_timeout(),
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| color_eyre::eyre::eyre!("connect timed out after {:?}", self.settings.connect_timeout()))??;

        info!(%url, "tunnel channel open");
        let (sink, mut stream) = ws_stream.split();
        let writer = spawn_tungstenite_writer(sink);
        writer
            .send(Frame::Ready {
                subdomain: subdomain.to_string(),
            })
            .map_err(|_| color_eyre::eyre::eyre!("writer closed before ready could be sent"))?;

        self.set_state(ClientState::Connected);
        self.attempts.store(0, Ordering::SeqCst);

        let heartbeat_interval = self.settings.heartbeat_interval();
        let half_open_after = heartbeat_interval * HALF_OPEN_MULTIPLIER;
        let mut last_seen = Instant::now();
        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    self.events.emit(ClientEvent::Close);
                    return Ok(());
                }

                _ = ticker.tick() => {
                    if last_seen.elapsed() > half_open_after {
                        warn!("no inbound frame for {:?}, closing possibly half-open channel", half_open_after);
                        return Ok(());
                    }
                    let _ = writer.send(Frame::Ping);
                }

                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return Ok(());
                    };
                    let msg = msg?;
                    last_seen = Instant::now();
                    match classify_tungstenite_message(msg) {
                        Inbound::Frame(Frame::Registered { subdomain, url }) => {
                            *self.registered_url.lock().unwrap() = Some(url.clone());
                            self.events.emit(ClientEvent::Connected { subdomain, url });
                        }
                        Inbound::Frame(Frame::Error { message }) => {
                            self.events.emit(ClientEvent::Error { message });
                        }
                        Inbound::Frame(frame @ Frame::Request { .. }) => {
                            self.dispatch_request(frame, &writer, fetcher);
                        }
                        Inbound::Frame(Frame::Pong) => {}
                        Inbound::Frame(_) => {}
                        Inbound::Close => return Ok(()),
                        Inbound::Ignored => debug!("ignored non-frame websocket message"),
                    }
                }
            }
        }
    }

    /// Spawn the local fetch for one `request` frame so concurrent
    /// requests on the same channel never block each other.
    fn dispatch_request(&self, frame: Frame, writer: &FrameWriter, fetcher: &Arc<LocalFetcher>) {
        let Frame::Request {
            id,
            method,
            path,
            headers,
            body,
            is_base64_encoded,
            ..
        } = frame
        else {
            return;
        };

        self.events.emit(ClientEvent::Request { id: id.clone() });
        let writer = writer.clone();
        let fetcher = Arc::clone(fetcher);
        let events = self.events.clone();
        tokio::spawn(async move {
            let response = fetcher
                .fetch(&id, &method, &path, headers, body, is_base64_encoded)
                .await;
            if let Frame::Response { status, .. } = &response {
                events.emit(ClientEvent::Response { id: id.clone(), status: *status });
            }
            let _ = writer.send(response);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_starts_disconnected() {
        let client = TunnelClient::new(ClientSettings::default());
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.registered_url().is_none());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let client = TunnelClient::new(ClientSettings::default());
        client.disconnect();
        client.disconnect();
        assert!(client.shutdown.is_cancelled());
    }
}
