pub mod channel;
pub mod events;
pub mod pending;
pub mod registry;
pub mod router;
pub mod state;
pub mod stats;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tunnel_core::config::ServerSettings;

use crate::events::ServerEvent;
use crate::state::AppState;

/// Initialize tracing/logging for the edge server. Call before `serve()`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnel_server=info,tower_http=info".into()),
        )
        .init();
}

/// Build the axum router: explicit routes for observability and the
/// control-channel upgrade, falling back to the forward path (C8) for
/// everything else (spec.md §4.8, §6).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/_health", get(router::health))
        .route("/health", get(router::health))
        .route("/_status", get(router::status))
        .route("/status", get(router::status))
        .route("/_metrics", get(router::metrics))
        .route("/metrics", get(router::metrics))
        .route("/", get(channel::ws_handler))
        .fallback(router::forward)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Spawn a task that listens for Ctrl+C and SIGTERM, then cancels the token.
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received Ctrl+C, shutting down…"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down…"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("received Ctrl+C, shutting down…");
        }
        shutdown.cancel();
    });
}

/// Run the edge server until `shutdown` is cancelled.
pub async fn serve(settings: ServerSettings, shutdown: CancellationToken) -> color_eyre::Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let state = Arc::new(AppState::new(settings));
    state.events.emit(ServerEvent::Start);

    let router = build_router(state.clone());
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "edge server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    state.events.emit(ServerEvent::Stop);
    info!("edge server stopped");
    Ok(())
}
