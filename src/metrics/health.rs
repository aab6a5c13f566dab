//! Monitoring HTTP server
//!
//! Serves probes, the Prometheus scrape endpoint and a live chat snapshot on
//! the metrics port, next to the WebSocket gateway.

use crate::metrics::collector::MetricsCollector;
use crate::service::app::ServiceHandle;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const ENDPOINTS: [&str; 5] = ["/health", "/ready", "/alive", "/metrics", "/stats"];

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the monitoring routes
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub service: Option<ServiceHandle>,
}

impl HealthServerState {
    fn service_name(&self) -> &str {
        self.service
            .as_ref()
            .map_or(env!("CARGO_PKG_NAME"), ServiceHandle::service_name)
    }
}

/// Monitoring server bound to the metrics port
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                service: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the running service so probes report on it
    pub fn with_service(mut self, service: ServiceHandle) -> Self {
        self.state.service = Some(service);
        self
    }

    /// Serve until [`HealthServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid metrics server address")?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics server to {}", addr))?;

        info!("📊 Metrics server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.create_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("Metrics server stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Metrics server was not running: {}", e);
        }
        Ok(())
    }
}

/// Render every registered metric family in the Prometheus text format
pub fn encode_metrics(collector: &MetricsCollector) -> Result<String> {
    let metric_families = collector.registry().gather();
    TextEncoder::new()
        .encode_to_string(&metric_families)
        .context("Failed to encode metrics")
}

fn status_code(status: &HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn not_initialized(state: &HealthServerState) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "service": state.service_name(),
            "status": HealthStatus::Unhealthy,
            "error": "Service not initialized"
        })),
    )
        .into_response()
}

fn probe_response(probe: &str, result: Result<HealthStatus>) -> Response {
    match result {
        Ok(status) => (
            status_code(&status),
            Json(json!({ "probe": probe, "status": status })),
        )
            .into_response(),
        Err(e) => {
            error!("{} probe failed: {}", probe, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "probe": probe, "status": HealthStatus::Unhealthy })),
            )
                .into_response()
        }
    }
}

async fn root_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    Json(json!({
        "service": state.service_name(),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ENDPOINTS
    }))
}

/// Full health report, 503 when unhealthy
async fn health_handler(State(state): State<HealthServerState>) -> Response {
    let Some(service) = &state.service else {
        return not_initialized(&state);
    };

    match HealthCheck::check(service).await {
        Ok(health) => (status_code(&health.status), Json(health)).into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            not_initialized(&state)
        }
    }
}

async fn ready_handler(State(state): State<HealthServerState>) -> Response {
    match &state.service {
        Some(service) => probe_response("ready", HealthCheck::readiness_check(service).await),
        None => not_initialized(&state),
    }
}

async fn alive_handler(State(state): State<HealthServerState>) -> Response {
    match &state.service {
        Some(service) => probe_response("alive", HealthCheck::liveness_check(service).await),
        None => not_initialized(&state),
    }
}

async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    match encode_metrics(&state.metrics_collector) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("{:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Live snapshot of connections, queues, rooms and relay traffic
async fn stats_handler(State(state): State<HealthServerState>) -> Response {
    let Some(service) = &state.service else {
        return not_initialized(&state);
    };

    let stats = match service.chat_manager().get_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to read chat stats: {}", e);
            return not_initialized(&state);
        }
    };
    debug!(
        "Serving stats: {} connections, {} rooms",
        stats.active_connections, stats.active_rooms
    );

    Json(json!({
        "service": {
            "name": service.service_name(),
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": service.uptime().as_secs()
        },
        "connections": {
            "active": stats.active_connections,
            "paired": stats.paired_connections,
            "total": stats.connections_total,
            "searching": {
                "default": stats.waiting_default,
                "constrained": stats.waiting_constrained
            }
        },
        "rooms": {
            "active": stats.active_rooms,
            "created": stats.rooms_created,
            "closed": stats.rooms_closed,
            "swept": stats.rooms_swept
        },
        "matches": {
            "default": stats.matches_default,
            "constrained": stats.matches_constrained
        },
        "relayed": {
            "messages": stats.messages_relayed,
            "signals": stats.signals_relayed
        },
        "timestamp": chrono::Utc::now()
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatManager;
    use crate::gateway::MockEventPublisher;
    use crate::types::FindPartnerRequest;
    use axum::{body::Body, http::Request};
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn collector() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::new().expect("Failed to create collector"))
    }

    fn service(collector: Arc<MetricsCollector>, running: bool) -> ServiceHandle {
        let publisher = Arc::new(MockEventPublisher::new());
        ServiceHandle::new(
            "vibe-match-eu",
            Arc::new(ChatManager::with_metrics(publisher, collector)),
            Arc::new(RwLock::new(running)),
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_root_uses_service_name() {
        let server = HealthServer::new(HealthServerConfig::default(), collector());
        let (status, body) = get_json(server.create_router(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "vibe-match");
        assert_eq!(body["endpoints"].as_array().unwrap().len(), ENDPOINTS.len());

        let collector = collector();
        let server = HealthServer::new(HealthServerConfig::default(), collector.clone())
            .with_service(service(collector, true));
        let (_, body) = get_json(server.create_router(), "/").await;
        assert_eq!(body["service"], "vibe-match-eu");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let collector = collector();
        collector.record_connection_opened();

        let server = HealthServer::new(HealthServerConfig::default(), collector.clone());
        let response = server
            .create_router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let text = encode_metrics(&collector).unwrap();
        assert!(text.contains("vibe_match_connections_total 1"));
    }

    #[tokio::test]
    async fn test_endpoints_without_service() {
        let server = HealthServer::new(HealthServerConfig::default(), collector());
        let app = server.create_router();

        for uri in ["/health", "/ready", "/alive", "/stats"] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
            assert_eq!(body["error"], "Service not initialized", "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_probes_follow_running_flag() {
        let collector = collector();
        let server = HealthServer::new(HealthServerConfig::default(), collector.clone())
            .with_service(service(collector, false));
        let app = server.create_router();

        let (status, body) = get_json(app.clone(), "/alive").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");

        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["service"], "vibe-match-eu");
    }

    #[tokio::test]
    async fn test_endpoints_with_running_service() {
        let collector = collector();
        let service = service(collector.clone(), true);
        let manager = service.chat_manager();
        for id in ["alice", "bob", "carol"] {
            manager.register_connection(id).await.unwrap();
        }
        for id in ["alice", "bob", "carol"] {
            manager
                .find_partner(id, FindPartnerRequest::default())
                .await
                .unwrap();
        }

        let server = HealthServer::new(HealthServerConfig::default(), collector)
            .with_service(service);
        let app = server.create_router();

        for uri in ["/ready", "/alive"] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(body["status"], "healthy", "{}", uri);
        }

        let (status, health) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["stats"]["active_connections"], 3);

        let (status, stats) = get_json(app, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["service"]["name"], "vibe-match-eu");
        assert_eq!(stats["connections"]["active"], 3);
        assert_eq!(stats["connections"]["paired"], 2);
        assert_eq!(stats["connections"]["searching"]["default"], 1);
        assert_eq!(stats["rooms"]["active"], 1);
        assert_eq!(stats["matches"]["default"], 1);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let server = HealthServer::new(HealthServerConfig::default(), collector());
        let response = server
            .create_router()
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
