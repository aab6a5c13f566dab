//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the vibe-match chat service
//! using Prometheus metrics.

use crate::chat::manager::ChatManagerStats;
use crate::types::{LeaveReason, QueueKind};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the chat service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Connection, queue and room metrics
    chat_metrics: ChatMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Inbound client events by name and outcome
    pub client_events_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Connection, queue and room metrics
#[derive(Clone)]
pub struct ChatMetrics {
    /// Connections accepted since start
    pub connections_total: IntCounter,

    /// Currently registered connections
    pub active_connections: IntGauge,

    /// Connections waiting on each queue
    pub users_searching: IntGaugeVec,

    /// Currently open rooms
    pub active_rooms: IntGauge,

    /// Rooms created, by the queue the partner was taken from
    pub rooms_created_total: IntCounterVec,

    /// Rooms torn down, by reason
    pub rooms_closed_total: IntCounterVec,

    /// Interest score of created rooms
    pub match_score: Histogram,

    /// Chat messages relayed
    pub messages_relayed_total: IntCounter,

    /// Chat messages that had banned words masked
    pub messages_filtered_total: IntCounter,

    /// Call-setup signals relayed, by kind
    pub signals_relayed_total: IntCounterVec,

    /// Daily rewards granted
    pub daily_rewards_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Time spent handling a findPartner intent
    pub find_partner_duration: Histogram,

    /// Time a connection spent searching before being paired
    pub search_wait_seconds: Histogram,

    /// Room manager operation durations
    pub room_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let chat_metrics = ChatMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            chat_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get chat metrics
    pub fn chat(&self) -> &ChatMetrics {
        &self.chat_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh the point-in-time gauges from a stats snapshot
    pub fn update_from_chat_stats(&self, stats: &ChatManagerStats) {
        self.chat_metrics
            .active_connections
            .set(stats.active_connections as i64);
        self.chat_metrics.active_rooms.set(stats.active_rooms as i64);
        self.chat_metrics
            .users_searching
            .with_label_values(&["default"])
            .set(stats.waiting_default as i64);
        self.chat_metrics
            .users_searching
            .with_label_values(&["constrained"])
            .set(stats.waiting_constrained as i64);
    }

    /// Record a newly registered connection
    pub fn record_connection_opened(&self) {
        self.chat_metrics.connections_total.inc();
        self.chat_metrics.active_connections.inc();
    }

    /// Record a connection leaving the registry
    pub fn record_connection_closed(&self) {
        self.chat_metrics.active_connections.dec();
    }

    /// Record an inbound client event and whether it decoded
    pub fn record_client_event(&self, event: &str, success: bool) {
        let status = if success { "ok" } else { "invalid" };
        self.service_metrics
            .client_events_total
            .with_label_values(&[event, status])
            .inc();
    }

    /// Record a findPartner intent being processed
    pub fn record_find_partner(&self, duration: Duration) {
        self.performance_metrics
            .find_partner_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a room being created
    pub fn record_room_created(&self, queue: Option<QueueKind>, score: u32, search_wait: Duration) {
        let queue_str = queue.map(|q| q.to_string()).unwrap_or_else(|| "none".to_string());
        self.chat_metrics
            .rooms_created_total
            .with_label_values(&[queue_str.as_str()])
            .inc();
        self.chat_metrics.active_rooms.inc();
        self.chat_metrics.match_score.observe(score as f64);
        self.performance_metrics
            .search_wait_seconds
            .observe(search_wait.as_secs_f64());
    }

    /// Record a room being torn down
    pub fn record_room_closed(&self, reason: LeaveReason) {
        self.chat_metrics
            .rooms_closed_total
            .with_label_values(&[reason.to_string().as_str()])
            .inc();
        self.chat_metrics.active_rooms.dec();
    }

    /// Record a chat message relay
    pub fn record_message_relayed(&self, filtered: bool) {
        self.chat_metrics.messages_relayed_total.inc();
        if filtered {
            self.chat_metrics.messages_filtered_total.inc();
        }
    }

    /// Record a call-setup signal relay
    pub fn record_signal_relayed(&self, kind: &str) {
        self.chat_metrics
            .signals_relayed_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record daily rewards granted in one pass
    pub fn record_daily_rewards(&self, granted: usize) {
        self.chat_metrics.daily_rewards_total.inc_by(granted as u64);
    }

    /// Record room manager operation duration
    pub fn record_room_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .room_operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Update service uptime
    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("vibe_match_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let client_events_total = IntCounterVec::new(
            Opts::new(
                "vibe_match_client_events_total",
                "Inbound client events processed",
            ),
            &["event", "status"],
        )?;
        registry.register(Box::new(client_events_total.clone()))?;

        let health_status = IntGauge::new(
            "vibe_match_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("vibe_match_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            client_events_total,
            health_status,
            component_health,
        })
    }
}

impl ChatMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let connections_total = IntCounter::new(
            "vibe_match_connections_total",
            "Connections accepted since start",
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let active_connections = IntGauge::new(
            "vibe_match_active_connections",
            "Currently registered connections",
        )?;
        registry.register(Box::new(active_connections.clone()))?;

        let users_searching = IntGaugeVec::new(
            Opts::new(
                "vibe_match_users_searching",
                "Connections waiting for a partner",
            ),
            &["queue"],
        )?;
        registry.register(Box::new(users_searching.clone()))?;

        let active_rooms = IntGauge::new("vibe_match_active_rooms", "Currently open rooms")?;
        registry.register(Box::new(active_rooms.clone()))?;

        let rooms_created_total = IntCounterVec::new(
            Opts::new("vibe_match_rooms_created_total", "Total rooms created"),
            &["queue"],
        )?;
        registry.register(Box::new(rooms_created_total.clone()))?;

        let rooms_closed_total = IntCounterVec::new(
            Opts::new("vibe_match_rooms_closed_total", "Total rooms torn down"),
            &["reason"],
        )?;
        registry.register(Box::new(rooms_closed_total.clone()))?;

        let match_score = Histogram::with_opts(
            HistogramOpts::new("vibe_match_match_score", "Interest score of created rooms")
                .buckets(vec![0.0, 10.0, 20.0, 33.0, 50.0, 67.0, 80.0, 100.0]),
        )?;
        registry.register(Box::new(match_score.clone()))?;

        let messages_relayed_total = IntCounter::new(
            "vibe_match_messages_relayed_total",
            "Chat messages relayed",
        )?;
        registry.register(Box::new(messages_relayed_total.clone()))?;

        let messages_filtered_total = IntCounter::new(
            "vibe_match_messages_filtered_total",
            "Chat messages with masked words",
        )?;
        registry.register(Box::new(messages_filtered_total.clone()))?;

        let signals_relayed_total = IntCounterVec::new(
            Opts::new(
                "vibe_match_signals_relayed_total",
                "Call-setup signals relayed",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(signals_relayed_total.clone()))?;

        let daily_rewards_total = IntCounter::new(
            "vibe_match_daily_rewards_total",
            "Daily rewards granted",
        )?;
        registry.register(Box::new(daily_rewards_total.clone()))?;

        Ok(Self {
            connections_total,
            active_connections,
            users_searching,
            active_rooms,
            rooms_created_total,
            rooms_closed_total,
            match_score,
            messages_relayed_total,
            messages_filtered_total,
            signals_relayed_total,
            daily_rewards_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let find_partner_duration = Histogram::with_opts(
            HistogramOpts::new(
                "vibe_match_find_partner_duration_seconds",
                "findPartner processing time",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(find_partner_duration.clone()))?;

        let search_wait_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "vibe_match_search_wait_seconds",
                "Time spent searching before a match",
            )
            .buckets(vec![0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0]),
        )?;
        registry.register(Box::new(search_wait_seconds.clone()))?;

        let room_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "vibe_match_room_operation_duration_seconds",
                "Room operation duration",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            &["operation"],
        )?;
        registry.register(Box::new(room_operation_duration.clone()))?;

        Ok(Self {
            find_partner_duration,
            search_wait_seconds,
            room_operation_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder;

    fn render(collector: &MetricsCollector) -> String {
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&collector.registry().gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _chat = collector.chat();
        let _performance = collector.performance();
    }

    #[test]
    fn test_room_lifecycle_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_room_created(Some(QueueKind::Default), 50, Duration::from_secs(2));
        collector.record_room_created(None, 0, Duration::ZERO);
        assert_eq!(collector.chat().active_rooms.get(), 2);

        collector.record_room_closed(LeaveReason::Skip);
        assert_eq!(collector.chat().active_rooms.get(), 1);
        assert_eq!(
            collector
                .chat()
                .rooms_closed_total
                .with_label_values(&["skip"])
                .get(),
            1
        );
    }

    #[test]
    fn test_connection_and_message_counters() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_connection_opened();
        collector.record_connection_opened();
        collector.record_connection_closed();
        collector.record_message_relayed(true);
        collector.record_message_relayed(false);
        collector.record_signal_relayed("media_offer");

        assert_eq!(collector.chat().connections_total.get(), 2);
        assert_eq!(collector.chat().active_connections.get(), 1);
        assert_eq!(collector.chat().messages_relayed_total.get(), 2);
        assert_eq!(collector.chat().messages_filtered_total.get(), 1);

        let text = render(&collector);
        assert!(text.contains("vibe_match_signals_relayed_total"));
    }

    #[test]
    fn test_gauges_follow_stats_snapshot() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let stats = ChatManagerStats {
            active_connections: 7,
            active_rooms: 2,
            waiting_default: 2,
            waiting_constrained: 1,
            ..Default::default()
        };

        collector.update_from_chat_stats(&stats);
        assert_eq!(collector.chat().active_connections.get(), 7);
        assert_eq!(collector.chat().active_rooms.get(), 2);
        assert_eq!(
            collector
                .chat()
                .users_searching
                .with_label_values(&["constrained"])
                .get(),
            1
        );
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_health_status(2);
        collector.update_component_health("chat_manager", true);
        collector.update_component_health("gateway", false);
        assert_eq!(collector.service().health_status.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}
