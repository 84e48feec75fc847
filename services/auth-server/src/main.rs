//! MCP Auth Server
//!
//! Single-binary OAuth 2.1 service for MCP servers:
//! 1. Publishes authorization server / protected resource metadata
//! 2. Runs the authorization-code + PKCE flow, optionally fronting an
//!    upstream identity provider
//! 3. Validates bearer tokens in front of the MCP endpoint

mod auth;
mod config;
mod error;
mod metrics;
mod mode;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::mode::{AuthRuntime, ModeSelection};

/// Time allowed for in-flight requests to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for calls to the upstream identity provider
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    runtime: Arc<AuthRuntime>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the axum router for the configured mode.
///
/// `max_connections` bounds concurrent requests across all routes.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let runtime = state.runtime.clone();

    let protected = Router::new()
        .route("/mcp", any(routes::mcp_endpoint))
        .route_layer(axum::middleware::from_fn_with_state(
            runtime.clone(),
            auth::require_bearer,
        ));

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(protected)
        .merge(routes::discovery_router(runtime.clone()));
    if let Some(coordinator) = runtime.coordinator.clone() {
        app = app.merge(routes::oauth_router(coordinator));
    }

    app.layer(axum::middleware::from_fn(routes::track_requests))
        .layer(tower::limit::GlobalConcurrencyLimitLayer::new(
            max_connections,
        ))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting mcp-auth-server");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        public_url = %config.server.public_url,
        mode = config.auth.mode.as_str(),
        clients = config.auth.clients.len(),
        upstream_secret = config
            .auth
            .upstream
            .as_ref()
            .is_some_and(|u| u.client_secret.is_some()),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let ModeSelection { runtime, sweep } = mode::select(&config, http);

    let state = AppState {
        runtime,
        started_at: Instant::now(),
        prometheus,
    };
    let app = build_router(state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race the drain against
    // the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    if let Some(sweep) = sweep {
        sweep.shutdown().await;
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: mode, uptime and, when this server issues tokens, the
/// size of each in-memory store.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = serde_json::json!({
        "status": "healthy",
        "mode": state.runtime.mode.as_str(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    if let Some(coordinator) = &state.runtime.coordinator {
        let stores = coordinator.stores();
        body["pending_requests"] = stores.pending.len().await.into();
        body["authorization_codes"] = stores.grants.len().await.into();
        body["access_tokens"] = stores.tokens.len().await.into();
        body["refresh_tokens"] = stores.tokens.refresh_len().await.into();
    }

    axum::Json(body)
}

/// Prometheus metrics endpoint: text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
