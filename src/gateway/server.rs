//! WebSocket gateway server
//!
//! Serves the chat endpoint over axum and shares one chat manager and one
//! channel publisher across every session.

use crate::chat::ChatManager;
use crate::config::Environment;
use crate::gateway::handlers::handle_socket;
use crate::gateway::publisher::ChannelEventPublisher;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Development allows any origin; production allows none
    pub environment: Environment,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            environment: Environment::Development,
        }
    }
}

/// Shared state for every WebSocket session
#[derive(Clone)]
pub struct GatewayState {
    pub chat_manager: Arc<ChatManager>,
    pub publisher: Arc<ChannelEventPublisher>,
}

/// Accepts WebSocket clients and hands each to a session task
pub struct GatewayServer {
    config: GatewayServerConfig,
    state: GatewayState,
    shutdown_tx: broadcast::Sender<()>,
}

impl GatewayServer {
    pub fn new(config: GatewayServerConfig, state: GatewayState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Bind and serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid gateway address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind gateway on {}", addr))?;

        info!(
            "Gateway listening on ws://{}/ws ({})",
            addr, self.config.environment
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, self.create_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Gateway shutdown signal received");
            })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Build the router with the WebSocket endpoint and CORS policy
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/ws", get(ws_upgrade))
            .layer(cors_layer(self.config.environment))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping gateway...");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to gateway: {}", e);
        }
        Ok(())
    }
}

/// Cross-origin policy for the given environment
pub fn cors_layer(environment: Environment) -> CorsLayer {
    match environment {
        Environment::Development => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        Environment::Production => CorsLayer::new(),
    }
}

async fn root_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let counts = state.chat_manager.user_counts().await;
    Json(json!({
        "service": "vibe-match",
        "version": env!("CARGO_PKG_VERSION"),
        "websocket": "/ws",
        "userCounts": counts,
    }))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
