//! Control-channel wire protocol: the `Frame` union of spec.md §3 and the
//! binary-body framing rules of §4.1.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One JSON message on the control channel, tagged by `type`.
///
/// Internally-tagged (`#[serde(tag = "type")]`) so the wire form is
/// `{"type": "request", ...}`. Unknown variants are tolerated by the
/// decoder (see `decode`), not by this enum — serde would otherwise
/// reject them outright, which would break forward-compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    /// Sent once by the server immediately after the WebSocket upgrade.
    Connected,

    /// Sent by the client once the channel is open, to bind a subdomain.
    Ready { subdomain: String },

    /// Server confirms the subdomain bound and gives the public URL.
    Registered { subdomain: String, url: String },

    /// Server rejects `ready` (or reports any other protocol error).
    Error { message: String },

    /// Server → client: replay this request against the local backend.
    Request {
        id: String,
        method: String,
        path: String,
        url: String,
        headers: HashMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(rename = "isBase64Encoded", skip_serializing_if = "Option::is_none")]
        is_base64_encoded: Option<bool>,
    },

    /// Client → server: the local backend's response to `id`.
    Response {
        id: String,
        status: u16,
        headers: HashMap<String, String>,
        body: String,
        #[serde(rename = "isBase64Encoded", skip_serializing_if = "Option::is_none")]
        is_base64_encoded: Option<bool>,
    },

    /// Client → server heartbeat.
    Ping,

    /// Server → client heartbeat reply.
    Pong,
}

/// Decode a text frame, tolerating unknown frame types (logged, ignored)
/// so the protocol can be extended forward-compatibly. Returns `None`
/// for both unparseable JSON and recognized-but-unhandled shapes.
pub fn decode(text: &str) -> Option<Frame> {
    match serde_json::from_str::<Frame>(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            debug!("dropping unparseable/unknown frame: {e}");
            None
        }
    }
}

/// Encode a frame as JSON text. Absent optional fields are omitted
/// (not emitted as `null`) via `skip_serializing_if` above.
pub fn encode(frame: &Frame) -> String {
    serde_json::to_string(frame).expect("Frame serializes infallibly")
}

/// Generate a short opaque random request id, unique within the
/// lifetime of a control channel with overwhelming probability.
pub fn generate_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..16)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Content-type prefixes that are transmitted as base64 rather than text.
const BINARY_PREFIXES: &[&str] = &[
    "application/octet-stream",
    "image/",
    "audio/",
    "video/",
    "application/pdf",
];

/// True when `content_type` indicates a binary body per spec.md §4.1.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    BINARY_PREFIXES.iter().any(|p| ct.starts_with(p))
}

/// Encode a raw body for the wire: base64 text + `is_base64_encoded=true`
/// for binary content types, or the body decoded as UTF-8 text otherwise.
/// Bodies that claim a textual content type but are not valid UTF-8 fall
/// back to base64 so no bytes are lost.
pub fn encode_body(bytes: &[u8], content_type: &str) -> (String, bool) {
    if is_binary_content_type(content_type) {
        (BASE64.encode(bytes), true)
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => (s.to_string(), false),
            Err(_) => (BASE64.encode(bytes), true),
        }
    }
}

/// Decode a wire body back to raw bytes, honoring `is_base64_encoded`
/// independently of content-type, per spec.md §4.1.
pub fn decode_body(body: &str, is_base64_encoded: bool) -> Result<Vec<u8>, base64::DecodeError> {
    if is_base64_encoded {
        BASE64.decode(body)
    } else {
        Ok(body.as_bytes().to_vec())
    }
}

/// Headers that the sender must strip before handing a request frame to
/// the local backend (spec.md §4.1: hop-by-hop and framing headers that
/// the local HTTP stack re-establishes).
pub const FORWARD_STRIP_HEADERS: &[&str] = &["host", "connection", "upgrade", "content-length"];

/// Headers that the server must strip from a response frame before
/// returning it to the public caller (spec.md §4.1: the body on the
/// wire is already decoded, so stale transfer framing would lie).
pub const RESPONSE_STRIP_HEADERS: &[&str] = &["content-encoding", "transfer-encoding"];

/// Lower-case every header key, as required for the forward path by
/// spec.md §3 ("headers are a string→string map with lower-cased keys").
pub fn lowercase_headers(headers: HashMap<String, String>) -> HashMap<String, String> {
    headers
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect()
}

/// Remove the headers in `strip` (case-insensitively) from `headers`.
pub fn strip_headers(headers: &mut HashMap<String, String>, strip: &[&str]) {
    headers.retain(|k, _| !strip.iter().any(|s| k.eq_ignore_ascii_case(s)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_variant() {
        let frames = vec![
            Frame::Connected,
            Frame::Ready {
                subdomain: "abc".into(),
            },
            Frame::Registered {
                subdomain: "abc".into(),
                url: "https://abc.example.com".into(),
            },
            Frame::Error {
                message: "boom".into(),
            },
            Frame::Request {
                id: "req1".into(),
                method: "GET".into(),
                path: "/x".into(),
                url: "http://abc.example.com/x".into(),
                headers: HashMap::from([("accept".into(), "*/*".into())]),
                body: Some("hi".into()),
                is_base64_encoded: Some(false),
            },
            Frame::Response {
                id: "req1".into(),
                status: 200,
                headers: HashMap::new(),
                body: "ok".into(),
                is_base64_encoded: None,
            },
            Frame::Ping,
            Frame::Pong,
        ];
        for frame in frames {
            let text = encode(&frame);
            let decoded = decode(&text).expect("should decode");
            assert_eq!(encode(&decoded), text);
        }
    }

    #[test]
    fn omits_absent_optional_fields() {
        let frame = Frame::Request {
            id: "a".into(),
            method: "GET".into(),
            path: "/".into(),
            url: "http://h/".into(),
            headers: HashMap::new(),
            body: None,
            is_base64_encoded: None,
        };
        let text = encode(&frame);
        assert!(!text.contains("\"body\""));
        assert!(!text.contains("\"isBase64Encoded\""));
    }

    #[test]
    fn unknown_type_is_ignored_not_rejected() {
        assert!(decode(r#"{"type":"future_frame","stuff":1}"#).is_none());
    }

    #[test]
    fn malformed_json_is_ignored() {
        assert!(decode("not json").is_none());
    }

    #[test]
    fn binary_content_type_detection() {
        assert!(is_binary_content_type("application/octet-stream"));
        assert!(is_binary_content_type("image/png"));
        assert!(is_binary_content_type("AUDIO/mpeg"));
        assert!(is_binary_content_type("application/pdf"));
        assert!(!is_binary_content_type("application/json"));
        assert!(!is_binary_content_type("text/plain"));
    }

    #[test]
    fn binary_body_round_trips_byte_exact() {
        let bytes: Vec<u8> = (0..=255).collect();
        let (encoded, is_b64) = encode_body(&bytes, "application/octet-stream");
        assert!(is_b64);
        let decoded = decode_body(&encoded, is_b64).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn text_body_round_trips_byte_exact() {
        let bytes = b"{\"hello\":\"world\"}".to_vec();
        let (encoded, is_b64) = encode_body(&bytes, "application/json");
        assert!(!is_b64);
        let decoded = decode_body(&encoded, is_b64).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn generate_id_is_unique_enough() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100_000 {
            assert!(seen.insert(generate_id()));
        }
    }

    #[test]
    fn strip_headers_is_case_insensitive() {
        let mut headers = HashMap::from([
            ("Content-Encoding".to_string(), "gzip".to_string()),
            ("X-Keep".to_string(), "yes".to_string()),
        ]);
        strip_headers(&mut headers, RESPONSE_STRIP_HEADERS);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("X-Keep"));
    }
}
