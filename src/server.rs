//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared, read-only state holding the
//! config, hop-by-hop skip set, outbound client and transcript sink),
//! [`build_router`] for constructing the Axum router, [`serve`] for
//! running it on a bound listener, and [`shutdown_signal`] for
//! SIGTERM / Ctrl+C handling.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::proxy;
use crate::proxy::client::ForwardingClient;
use crate::proxy::headers::SkipSet;
use crate::proxy::recorder::TranscriptSink;

/// Everything a request handler needs. Built once before the listener
/// starts accepting and never mutated afterwards.
pub struct AppState {
    pub config: ProxyConfig,
    pub skip: SkipSet,
    pub client: ForwardingClient,
    pub sink: Arc<dyn TranscriptSink>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ProxyConfig, sink: Arc<dyn TranscriptSink>) -> Self {
        let client = ForwardingClient::new(config.upstream_timeout);
        Self {
            config,
            skip: SkipSet::hop_by_hop(),
            client,
            sink,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(proxy::forward_handler)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serve the proxy on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
