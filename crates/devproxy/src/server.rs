//! Axum HTTP server: proxy middleware, static files, listener, graceful shutdown.

use std::path::Path;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::DevServerConfig;
use crate::router::{DevProxyRouter, RoutedOutcome};
use crate::stats::ProxyStats;

/// Path prefix of the dev server's own endpoints.
const INTERNAL_PREFIX: &str = "/__devproxy/";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: DevServerConfig,
    pub router: DevProxyRouter,
    pub stats: ProxyStats,
}

/// Build the axum app.
///
/// Every request passes through the proxy middleware first. Requests no rule
/// claims fall through to the internal routes, then to the static directory.
pub fn app(state: AppState) -> Router {
    let local = Router::new()
        .route("/__devproxy/health", get(handle_health))
        .route("/__devproxy/stats", get(handle_stats));

    let local = match state.config.server.static_dir.as_deref() {
        Some(dir) => {
            if !Path::new(dir).is_dir() {
                tracing::warn!(static_dir = %dir, "Static directory does not exist");
            }
            local.fallback_service(ServeDir::new(dir))
        }
        None => local.fallback(handle_not_found),
    };

    local
        .layer(middleware::from_fn_with_state(state.clone(), proxy_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "devproxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("devproxy shut down gracefully");
    Ok(())
}

/// Offer each request to the router; unmatched requests continue locally.
async fn proxy_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let internal = request.uri().path().starts_with(INTERNAL_PREFIX);
    let outcome = state.router.route(request).await;
    // The dev server's own endpoints are not traffic; don't count them.
    if !(internal && matches!(outcome, RoutedOutcome::NotProxied(_))) {
        state.stats.record(&outcome);
    }
    if let Some(status) = outcome.status() {
        tracing::debug!(status = status.as_u16(), "Request handled by proxy");
    }

    match outcome {
        RoutedOutcome::NotProxied(request) => next.run(request).await,
        other => other.into_response(),
    }
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
