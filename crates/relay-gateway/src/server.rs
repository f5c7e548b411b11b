//! Gateway HTTP server — Axum router in front of the chat relay

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use relay_core::{ChatRelay, ChatRequest, Reply};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::protocol::{StatusResponse, routes};

/// Shared state for all requests; read-only after startup
#[derive(Clone)]
pub struct GatewayState {
    pub relay: Arc<ChatRelay>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(relay: Arc<ChatRelay>) -> Self {
        Self {
            relay,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, relay: Arc<ChatRelay>) -> Self {
        Self {
            state: GatewayState::new(relay),
            bind,
        }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route(routes::CHAT, post(chat_handler))
            .route(routes::STATUS, get(status_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!(
            "Gateway listening on {} ({} models)",
            self.bind,
            self.state.relay.dispatcher().candidates().len()
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

// ── HTTP Handlers ──

async fn chat_handler(State(state): State<GatewayState>, body: Bytes) -> Response {
    debug!("Chat request: {} bytes", body.len());
    let request = ChatRequest::from_body(&body);
    let reply = state.relay.handle(request).await;
    reply_response(reply)
}

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let settings = state.relay.settings();
    axum::Json(StatusResponse {
        status: "ok".to_string(),
        models: state
            .relay
            .dispatcher()
            .candidates()
            .iter()
            .map(|m| m.to_string())
            .collect(),
        api_key_configured: settings.api_key().is_some(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        started_at: state.started_at.to_rfc3339(),
    })
}

fn reply_response(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(reply.body)).into_response()
}
