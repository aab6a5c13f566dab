//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the vibe-match chat
//! service, including readiness and liveness probes.

use crate::chat::ChatManagerStats;
use crate::service::app::ServiceHandle;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Chat manager probes slower than this report degraded
const CHAT_MANAGER_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Crate version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Connected sockets
    pub active_connections: usize,
    /// Open chat rooms
    pub active_rooms: usize,
    /// Connections waiting in either queue
    pub users_searching: usize,
    /// Rooms created since service start
    pub rooms_created: u64,
    /// Messages relayed since service start
    pub messages_relayed: u64,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
}

impl ServiceStats {
    fn from_chat_stats(stats: &ChatManagerStats, uptime: Duration) -> Self {
        Self {
            active_connections: stats.active_connections,
            active_rooms: stats.active_rooms,
            users_searching: stats.waiting_default + stats.waiting_constrained,
            rooms_created: stats.rooms_created,
            messages_relayed: stats.messages_relayed,
            uptime_seconds: uptime.as_secs(),
        }
    }
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(handle: &ServiceHandle) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(handle).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let (chat_check, chat_stats) = Self::check_chat_manager(handle).await;
        if chat_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if chat_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(chat_check);

        let stats = match chat_stats {
            Some(stats) => ServiceStats::from_chat_stats(&stats, handle.uptime()),
            None => {
                debug!("Chat stats unavailable for health check");
                ServiceStats {
                    uptime_seconds: handle.uptime().as_secs(),
                    ..Default::default()
                }
            }
        };

        Ok(HealthCheck {
            status: overall_status,
            service: handle.service_name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(handle: &ServiceHandle) -> Result<HealthStatus> {
        if handle.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(handle: &ServiceHandle) -> Result<HealthStatus> {
        if !handle.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_chat_manager(handle).await.0.status)
    }

    async fn check_service_running(handle: &ServiceHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if handle.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The chat manager is healthy when its state lock can be taken promptly
    async fn check_chat_manager(
        handle: &ServiceHandle,
    ) -> (ComponentCheck, Option<ChatManagerStats>) {
        let start = std::time::Instant::now();

        let probe =
            tokio::time::timeout(CHAT_MANAGER_PROBE_TIMEOUT, handle.chat_manager().get_stats())
                .await;

        let (status, message, stats) = match probe {
            Ok(Ok(stats)) => (HealthStatus::Healthy, None, Some(stats)),
            Ok(Err(e)) => {
                error!("Chat manager stats check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Stats check failed: {}", e)),
                    None,
                )
            }
            Err(_) => (
                HealthStatus::Degraded,
                Some("Chat manager is busy".to_string()),
                None,
            ),
        };

        let check = ComponentCheck {
            name: "chat_manager".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        (check, stats)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatManager;
    use crate::gateway::MockEventPublisher;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn handle(running: bool) -> ServiceHandle {
        let publisher = Arc::new(MockEventPublisher::new());
        ServiceHandle::new(
            "vibe-match-test",
            Arc::new(ChatManager::new(publisher).unwrap()),
            Arc::new(RwLock::new(running)),
        )
    }

    #[tokio::test]
    async fn test_healthy_when_running() {
        let handle = handle(true);
        handle
            .chat_manager()
            .register_connection("alice")
            .await
            .unwrap();

        let health = HealthCheck::check(&handle).await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.service, "vibe-match-test");
        assert_eq!(health.checks.len(), 2);
        assert_eq!(health.stats.active_connections, 1);

        let json = health.to_json().unwrap();
        assert!(json.contains("chat_manager"));
    }

    #[tokio::test]
    async fn test_unhealthy_when_stopped() {
        let handle = handle(false);

        assert_eq!(
            HealthCheck::liveness_check(&handle).await.unwrap(),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::readiness_check(&handle).await.unwrap(),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::check(&handle).await.unwrap().status,
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_status_display() {
        assert!(HealthStatus::Healthy.to_string().contains("healthy"));
        assert!(HealthStatus::Degraded.to_string().contains("degraded"));
    }
}
