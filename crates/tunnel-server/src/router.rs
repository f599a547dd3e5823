//! C8 Edge HTTP Router (spec.md §4.8): health/status/metrics plus the
//! forward path that drives the Subdomain Registry (C6) and the
//! Pending-Response Table (C7).

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use tunnel_core::frame::{
    decode_body, encode_body, generate_id, lowercase_headers, strip_headers, Frame,
    RESPONSE_STRIP_HEADERS,
};
use tunnel_core::subdomain::subdomain_from_host;

use crate::events::ServerEvent;
use crate::pending::PendingOutcome;
use crate::state::AppState;
use crate::stats::{metrics_text, StatusResponse};

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse::new(&state.stats, state.registry.snapshot()))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = metrics_text(&state.stats, state.registry.snapshot().len());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

fn tunnel_not_found(subdomain: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Tunnel not found",
            "subdomain": subdomain,
            "message": "no tunnel client is registered for this subdomain",
        })),
    )
        .into_response()
}

/// spec.md §4.8 steps 5-8: derive the subdomain, dispatch a `request`
/// frame on a live channel, and convert the eventual outcome back into
/// an HTTP response. Used as the router's fallback, so it only ever
/// sees paths not claimed by `/health`, `/status`, `/metrics` or `/`.
pub async fn forward(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let Some(subdomain) = subdomain_from_host(&host) else {
        return tunnel_not_found(&host);
    };

    let Some(channel) = state.registry.pick(&subdomain) else {
        return tunnel_not_found(&subdomain);
    };

    let method = req.method().to_string();
    // Keep the query string attached — the Local Fetcher replays this
    // verbatim against the local backend, so a query-less path here would
    // silently drop it (e.g. `GET /search?q=x` would reach the backend as
    // `/search`).
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/")
        .to_string();

    let headers = lowercase_headers(
        req.headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect::<HashMap<_, _>>(),
    );
    let content_type = headers.get("content-type").cloned().unwrap_or_default();

    let body_bytes = match axum::body::to_bytes(req.into_body(), state.settings.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response(),
    };
    let bytes_in = body_bytes.len() as u64;
    let (body, is_base64_encoded) = encode_body(&body_bytes, &content_type);

    let id = generate_id();
    let url = format!("http://{host}{path_and_query}");
    let frame = Frame::Request {
        id: id.clone(),
        method,
        path: path_and_query,
        url,
        headers,
        body: Some(body),
        is_base64_encoded: Some(is_base64_encoded),
    };

    let rx = state
        .pending
        .register(id.clone(), channel.id, state.settings.request_timeout());

    if !channel.send(frame) {
        state.pending.purge(channel.id);
        return (
            StatusCode::BAD_GATEWAY,
            "tunnel client disconnected before the request could be sent",
        )
            .into_response();
    }

    state.stats.record_request(bytes_in, 0);
    state.events.emit(ServerEvent::Request {
        id,
        subdomain,
    });

    match rx.await {
        Ok(PendingOutcome::Completed {
            status,
            mut headers,
            body,
            is_base64_encoded,
        }) => {
            strip_headers(&mut headers, RESPONSE_STRIP_HEADERS);
            let bytes = match decode_body(&body, is_base64_encoded) {
                Ok(bytes) => bytes,
                Err(_) => {
                    return (
                        StatusCode::BAD_GATEWAY,
                        "malformed response body from tunnel client",
                    )
                        .into_response();
                }
            };
            state.stats.record_request(0, bytes.len() as u64);
            let mut builder =
                Response::builder().status(StatusCode::from_u16(status).unwrap_or(StatusCode::OK));
            for (k, v) in &headers {
                builder = builder.header(k, v);
            }
            builder
                .body(Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        Ok(PendingOutcome::Timeout) => (
            StatusCode::GATEWAY_TIMEOUT,
            "Gateway timeout — tunnel client did not respond",
        )
            .into_response(),
        Ok(PendingOutcome::ChannelLost) | Err(_) => (
            StatusCode::BAD_GATEWAY,
            "tunnel client disconnected before responding",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::new(tunnel_core::config::ServerSettings {
            base_domain: "localhost".into(),
            ..Default::default()
        }));
        let router = Router::new()
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/metrics", get(metrics))
            .fallback(forward)
            .with_state(state.clone());
        (router, state)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (app, _state) = app();
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn status_reports_zero_connections_when_idle() {
        let (app, _state) = app();
        let res = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
    }

    #[tokio::test]
    async fn metrics_contains_expected_counter_names() {
        let (app, _state) = app();
        let res = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("tunnel_requests_total"));
    }

    #[tokio::test]
    async fn unknown_subdomain_is_404_with_json_error() {
        let (app, _state) = app();
        let req = Request::builder()
            .uri("/anything")
            .header(header::HOST, "nonexistent.localhost")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Tunnel not found");
    }

    #[tokio::test]
    async fn missing_host_header_is_404() {
        let (app, _state) = app();
        let req = Request::builder().uri("/anything").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forward_times_out_when_channel_never_responds() {
        let settings = tunnel_core::config::ServerSettings {
            base_domain: "localhost".into(),
            request_timeout_secs: 0,
            ..Default::default()
        };
        let state = Arc::new(AppState::new(settings));
        let (writer, mut rx) = tunnel_ws::FrameWriter::for_testing();
        let handle = crate::registry::ChannelHandle::new(1, writer);
        state.registry.add("demo", handle);
        let router = Router::new().fallback(forward).with_state(state);

        let req = Request::builder()
            .uri("/slow")
            .header(header::HOST, "demo.localhost")
            .body(Body::empty())
            .unwrap();
        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
        // the request frame was sent on the (never-read) test channel
        assert!(rx.recv().await.is_some());
    }
}
