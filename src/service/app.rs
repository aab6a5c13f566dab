//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the chat manager to
//! the WebSocket gateway and the metrics server, and runs the periodic tasks.

use crate::chat::{ChatManager, ContentFilter, MatchingEngine};
use crate::config::AppConfig;
use crate::gateway::server::{GatewayServer, GatewayServerConfig, GatewayState};
use crate::gateway::ChannelEventPublisher;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Read-only view of the running service used by health checks
#[derive(Clone)]
pub struct ServiceHandle {
    service_name: String,
    chat_manager: Arc<ChatManager>,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl ServiceHandle {
    pub fn new(
        service_name: impl Into<String>,
        chat_manager: Arc<ChatManager>,
        is_running: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            chat_manager,
            is_running,
            started_at: Instant::now(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn chat_manager(&self) -> Arc<ChatManager> {
        self.chat_manager.clone()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Registry, queues and rooms
    chat_manager: Arc<ChatManager>,

    /// WebSocket gateway
    gateway: Arc<GatewayServer>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    /// Health check view shared with the metrics server
    handle: ServiceHandle,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing vibe-match chat service");
        info!(
            "Configuration: service={}, environment={}, gateway_port={}, metrics_port={}, matching={}",
            config.service.name,
            config.service.environment,
            config.service.port,
            config.service.metrics_port,
            config.matchmaking.mode
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let publisher = Arc::new(ChannelEventPublisher::new());
        let chat_manager = Self::initialize_chat_system(
            &config,
            publisher.clone(),
            metrics_collector.clone(),
        )?;

        let is_running = Arc::new(RwLock::new(false));
        let handle = ServiceHandle::new(
            config.service.name.clone(),
            chat_manager.clone(),
            is_running.clone(),
        );

        let metrics_service = Self::initialize_metrics(&config, metrics_collector, handle.clone());

        let gateway = Arc::new(GatewayServer::new(
            GatewayServerConfig {
                host: config.service.host.clone(),
                port: config.service.port,
                environment: config.service.environment,
            },
            GatewayState {
                chat_manager: chat_manager.clone(),
                publisher,
            },
        ));

        Ok(Self {
            config,
            chat_manager,
            gateway,
            metrics_service,
            background_tasks: Vec::new(),
            is_running,
            handle,
        })
    }

    /// Start the servers and the periodic tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting vibe-match chat service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await?;
        self.start_gateway().await?;
        self.start_background_tasks().await?;

        info!("✅ vibe-match chat service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of vibe-match service");

        *self.is_running.write().await = false;

        info!("Stopping gateway...");
        if let Err(e) = self.gateway.stop().await {
            warn!("Failed to stop gateway: {}", e);
        } else {
            info!("✅ Gateway stopped");
        }

        self.stop_background_tasks().await;

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        let final_stats =
            self.chat_manager
                .get_stats()
                .await
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ vibe-match service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn chat_manager(&self) -> Arc<ChatManager> {
        self.chat_manager.clone()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Health check view of this service
    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    fn initialize_chat_system(
        config: &AppConfig,
        publisher: Arc<ChannelEventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Arc<ChatManager>, ServiceError> {
        info!("Initializing chat system components");

        let engine = MatchingEngine::new(config.matching_config());
        let filter = ContentFilter::new(config.moderation.banned_words.as_slice()).map_err(|e| {
            ServiceError::Configuration {
                message: format!("Failed to build content filter: {}", e),
            }
        })?;

        info!(
            "Chat system ready - matching: {}, banned words: {}",
            config.matchmaking.mode,
            config.moderation.banned_words.len()
        );

        Ok(Arc::new(ChatManager::with_components(
            engine,
            filter,
            publisher,
            metrics_collector,
        )))
    }

    fn initialize_metrics(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
        handle: ServiceHandle,
    ) -> Arc<MetricsService> {
        info!(
            "Initializing metrics service on port {}",
            config.service.metrics_port
        );

        let health_config = HealthServerConfig {
            port: config.service.metrics_port,
            host: config.service.host.clone(),
        };

        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_service(handle),
        );
        Arc::new(MetricsService::new(metrics_collector, health_server))
    }

    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.metrics_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(metrics_handle);

        // Give the server a moment to start up
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    async fn start_gateway(&mut self) -> Result<(), ServiceError> {
        let gateway = self.gateway.clone();
        let is_running = self.is_running.clone();

        let gateway_handle = tokio::spawn(async move {
            if let Err(e) = gateway.start().await {
                error!("Gateway failed: {}", e);
                *is_running.write().await = false;
            }
        });
        self.background_tasks.push(gateway_handle);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        if !self.is_running().await {
            return Err(ServiceError::Initialization {
                message: format!("Gateway failed to start on port {}", self.config.service.port),
            });
        }

        info!("✅ Gateway started on port {}", self.config.service.port);
        Ok(())
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&mut self) -> Result<(), ServiceError> {
        info!("Starting background maintenance tasks...");

        // User counts broadcast
        info!(
            "Starting user counts task ({}s interval)...",
            self.config.user_counts_interval().as_secs()
        );
        let counts_task = {
            let chat_manager = self.chat_manager.clone();
            let counts_interval = self.config.user_counts_interval();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(counts_interval);
                info!("User counts task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match chat_manager.broadcast_user_counts().await {
                        Ok(counts) => debug!(
                            "Broadcast user counts - matching: {}, connected: {}",
                            counts.matching, counts.connected
                        ),
                        Err(e) => warn!("User counts broadcast failed: {}", e),
                    }
                }

                info!("User counts task stopped");
            })
        };

        // Stale room sweep
        info!(
            "Starting stale room sweep task ({}s interval, max age {}s)...",
            self.config.stale_sweep_interval().as_secs(),
            self.config.matchmaking.max_room_age_seconds
        );
        let sweep_task = {
            let chat_manager = self.chat_manager.clone();
            let sweep_interval = self.config.stale_sweep_interval();
            let max_age = self.config.max_room_age();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(sweep_interval);
                info!("Stale room sweep task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match chat_manager.sweep_stale_rooms(max_age).await {
                        Ok(swept) => {
                            if swept > 0 {
                                info!("Swept {} stale rooms", swept);
                            } else {
                                debug!("Sweep completed - no stale rooms found");
                            }
                        }
                        Err(e) => warn!("Stale room sweep failed: {}", e),
                    }
                }

                info!("Stale room sweep task stopped");
            })
        };

        // Daily rewards (if enabled)
        let rewards_task = if self.config.matchmaking.enable_daily_rewards {
            info!(
                "Starting daily reward task ({}s interval, {} coins)...",
                self.config.daily_reward_interval().as_secs(),
                self.config.matchmaking.daily_reward_coins
            );
            let chat_manager = self.chat_manager.clone();
            let reward_interval = self.config.daily_reward_interval();
            let coins = self.config.matchmaking.daily_reward_coins;
            let is_running = self.is_running.clone();

            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(reward_interval);
                info!("Daily reward task started");

                while *is_running.read().await {
                    interval.tick().await;

                    if let Err(e) = chat_manager.award_daily_rewards(coins).await {
                        warn!("Daily reward pass failed: {}", e);
                    }
                }

                info!("Daily reward task stopped");
            }))
        } else {
            info!("Daily rewards disabled - skipping reward task");
            None
        };

        // Chat gauges and service health metrics
        info!("Starting metrics update task (30s interval)...");
        let metrics_task = {
            let handle = self.handle.clone();
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                info!("Metrics update task started");

                while *is_running.read().await {
                    interval.tick().await;

                    metrics_collector.update_uptime(handle.uptime());

                    match crate::service::HealthCheck::check(&handle).await {
                        Ok(health) => {
                            let status = match health.status {
                                crate::service::HealthStatus::Healthy => 2,
                                crate::service::HealthStatus::Degraded => 1,
                                crate::service::HealthStatus::Unhealthy => 0,
                            };
                            metrics_collector.update_health_status(status);
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != crate::service::HealthStatus::Unhealthy,
                                );
                            }
                        }
                        Err(e) => warn!("Health check for metrics failed: {}", e),
                    }

                    match handle.chat_manager().get_stats().await {
                        Ok(stats) => {
                            debug!(
                                "Updating metrics - connections: {}, rooms: {}, waiting: {}",
                                stats.active_connections,
                                stats.active_rooms,
                                stats.waiting_default + stats.waiting_constrained
                            );
                            metrics_collector.update_from_chat_stats(&stats);
                        }
                        Err(e) => warn!("Failed to get chat stats for metrics update: {}", e),
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        let mut task_count = 3; // counts, sweep, metrics
        self.background_tasks.push(counts_task);
        self.background_tasks.push(sweep_task);
        self.background_tasks.push(metrics_task);
        if let Some(task) = rewards_task {
            self.background_tasks.push(task);
            task_count += 1;
        }

        info!(
            "{} background maintenance tasks started successfully",
            task_count
        );
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        info!("✅ All {} background tasks stopped", task_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_initializes_without_starting() {
        let state = AppState::new(AppConfig::default()).await.unwrap();
        assert!(!state.is_running().await);
        assert_eq!(state.handle().service_name(), "vibe-match");

        let stats = state.chat_manager().get_stats().await.unwrap();
        assert_eq!(stats.active_connections, 0);
    }

    #[tokio::test]
    async fn test_handle_tracks_running_flag() {
        let state = AppState::new(AppConfig::default()).await.unwrap();
        let handle = state.handle();

        *state.is_running.write().await = true;
        assert!(handle.is_running().await);
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::Configuration {
            message: "bad filter".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: bad filter");
    }
}
