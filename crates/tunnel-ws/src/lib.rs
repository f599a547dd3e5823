//! Adapts the `Frame` codec in `tunnel-core` to the two WebSocket
//! implementations this workspace straddles: `axum`'s server-side
//! `WebSocket` and `tokio-tungstenite`'s client-side `WebSocketStream`.
//! Both the edge server and the tunnel client drive the same frame
//! protocol, just through different libraries' `Message` types.

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tracing::warn;

use tunnel_core::frame::{decode, encode, Frame};

/// What an inbound WebSocket message means at the application layer.
pub enum Inbound {
    /// A recognized `Frame`.
    Frame(Frame),
    /// The peer closed the channel.
    Close,
    /// A WebSocket-protocol message with no `Frame` meaning (binary,
    /// unparseable text, an unknown frame type) — not a close, not a frame.
    Ignored,
}

pub fn classify_axum_message(msg: AxumMessage) -> Inbound {
    match msg {
        AxumMessage::Text(text) => decode(&text).map(Inbound::Frame).unwrap_or(Inbound::Ignored),
        AxumMessage::Close(_) => Inbound::Close,
        _ => Inbound::Ignored,
    }
}

pub fn classify_tungstenite_message(msg: TungsteniteMessage) -> Inbound {
    match msg {
        TungsteniteMessage::Text(text) => {
            decode(text.as_str()).map(Inbound::Frame).unwrap_or(Inbound::Ignored)
        }
        TungsteniteMessage::Close(_) => Inbound::Close,
        _ => Inbound::Ignored,
    }
}

/// A handle to a control channel's single outbound writer task.
///
/// Concurrent senders call `send`; the task behind this handle serializes
/// all of them onto the underlying socket in the order `send` was called,
/// so frames from different in-flight requests never interleave
/// (spec.md §5: "a per-channel write mutex or a send queue").
#[derive(Clone)]
pub struct FrameWriter {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameWriter {
    /// Enqueue a frame for sending. Fails only once the writer task has
    /// exited (the channel is closed or gone).
    pub fn send(&self, frame: Frame) -> Result<(), Frame> {
        self.tx.send(frame).map_err(|e| e.0)
    }

    /// A `FrameWriter` with no backing socket, for tests that only need
    /// to observe what was sent.
    pub fn for_testing() -> (FrameWriter, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FrameWriter { tx }, rx)
    }
}

/// Spawn the writer task for a server-side (`axum`) control channel.
pub fn spawn_axum_writer(mut sink: SplitSink<WebSocket, AxumMessage>) -> FrameWriter {
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = encode(&frame);
            if let Err(e) = sink.send(AxumMessage::Text(text.into())).await {
                warn!("control channel write failed, closing writer: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    });
    FrameWriter { tx }
}

/// Spawn the writer task for a client-side (`tokio-tungstenite`) control
/// channel. Generic over the sink so it works whether or not TLS is in
/// play (`MaybeTlsStream`).
pub fn spawn_tungstenite_writer<S>(mut sink: S) -> FrameWriter
where
    S: futures_util::Sink<TungsteniteMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin
        + Send
        + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = encode(&frame);
            if let Err(e) = sink.send(TungsteniteMessage::Text(text.into())).await {
                warn!("control channel write failed, closing writer: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    });
    FrameWriter { tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_close() {
        assert!(matches!(
            classify_tungstenite_message(TungsteniteMessage::Close(None)),
            Inbound::Close
        ));
    }

    #[test]
    fn classify_recognizes_frame() {
        let text = encode(&Frame::Ping);
        match classify_tungstenite_message(TungsteniteMessage::Text(text.into())) {
            Inbound::Frame(Frame::Ping) => {}
            _ => panic!("expected Frame::Ping"),
        }
    }

    #[test]
    fn classify_ignores_binary() {
        assert!(matches!(
            classify_tungstenite_message(TungsteniteMessage::Binary(vec![1, 2, 3].into())),
            Inbound::Ignored
        ));
    }
}
