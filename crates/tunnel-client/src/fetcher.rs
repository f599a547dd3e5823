//! C4 Local Fetcher (spec.md §4.4): replay a forwarded `request` frame
//! against the tunnel client's local backend and build the `response`
//! frame sent back over the control channel.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::redirect::Policy;
use serde_json::json;

use tunnel_core::frame::{decode_body, encode_body, strip_headers, Frame, FORWARD_STRIP_HEADERS};

/// Headers the local backend's own HTTP stack re-establishes; stripped
/// from the response before it is sent back over the control channel.
const RESPONSE_STRIP_HEADERS: &[&str] = &["content-encoding", "transfer-encoding", "connection"];

pub struct LocalFetcher {
    client: reqwest::Client,
    local_host: String,
    local_port: u16,
    max_body_bytes: usize,
}

impl LocalFetcher {
    pub fn new(local_host: String, local_port: u16, timeout: Duration, max_body_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a fixed, valid configuration");
        Self {
            client,
            local_host,
            local_port,
            max_body_bytes,
        }
    }

    /// Replay the `request` frame's fields and return a `response` frame
    /// carrying the same `id`. Never returns `Err`: failures to reach the
    /// local backend are folded into a synthesized 502 `response` frame,
    /// per spec.md §4.4 step 6.
    pub async fn fetch(
        &self,
        id: &str,
        method: &str,
        path: &str,
        headers: HashMap<String, String>,
        body: Option<String>,
        is_base64_encoded: Option<bool>,
    ) -> Frame {
        let url = format!("http://{}:{}{}", self.local_host, self.local_port, path);

        let mut forward_headers = headers;
        strip_headers(&mut forward_headers, FORWARD_STRIP_HEADERS);

        let body_bytes = match body {
            Some(b) => match decode_body(&b, is_base64_encoded.unwrap_or(false)) {
                Ok(bytes) => bytes,
                Err(e) => return backend_unreachable(id, &url, &format!("malformed request body: {e}")),
            },
            None => Vec::new(),
        };
        if body_bytes.len() > self.max_body_bytes {
            return backend_unreachable(id, &url, "request body exceeds the configured size limit");
        }

        let method = match reqwest::Method::from_bytes(method.as_bytes()) {
            Ok(m) => m,
            Err(_) => return backend_unreachable(id, &url, &format!("invalid HTTP method: {method}")),
        };

        let mut req = self.client.request(method, &url);
        for (k, v) in &forward_headers {
            req = req.header(k, v);
        }
        if !body_bytes.is_empty() {
            req = req.body(body_bytes);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => return backend_unreachable(id, &url, &e.to_string()),
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let mut response_headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        strip_headers(&mut response_headers, RESPONSE_STRIP_HEADERS);

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return backend_unreachable(id, &url, &e.to_string()),
        };
        if bytes.len() > self.max_body_bytes {
            return backend_unreachable(id, &url, "response body exceeds the configured size limit");
        }

        let (body, is_base64_encoded) = encode_body(&bytes, &content_type);
        Frame::Response {
            id: id.to_string(),
            status,
            headers: response_headers,
            body,
            is_base64_encoded: Some(is_base64_encoded),
        }
    }
}

/// Build the synthesized 502 `response` frame of spec.md §4.4 step 6.
fn backend_unreachable(id: &str, target: &str, message: &str) -> Frame {
    let payload = json!({ "error": "Local backend unreachable", "target": target, "message": message });
    Frame::Response {
        id: id.to_string(),
        status: 502,
        headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
        body: payload.to_string(),
        is_base64_encoded: Some(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_backend_yields_502_response_frame() {
        let fetcher = LocalFetcher::new("127.0.0.1".into(), 1, Duration::from_millis(200), 1024 * 1024);
        let frame = fetcher
            .fetch("req1", "GET", "/", HashMap::new(), None, None)
            .await;
        match frame {
            Frame::Response { id, status, body, .. } => {
                assert_eq!(id, "req1");
                assert_eq!(status, 502);
                assert!(body.contains("Local backend unreachable"));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_request_body_is_rejected_before_sending() {
        let fetcher = LocalFetcher::new("127.0.0.1".into(), 1, Duration::from_secs(1), 4);
        let frame = fetcher
            .fetch(
                "req2",
                "POST",
                "/",
                HashMap::new(),
                Some("toolong".into()),
                Some(false),
            )
            .await;
        match frame {
            Frame::Response { status, body, .. } => {
                assert_eq!(status, 502);
                assert!(body.contains("size limit"));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }
}
