//! Test fixtures for integration testing
//!
//! Clients are attached to a real `ChannelEventPublisher`, so every test sees
//! exactly the frames a socket writer would send.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use vibe_match::chat::{ChatManager, ContentFilter, MatchingConfig, MatchingEngine};
use vibe_match::gateway::messages::ServerEvent;
use vibe_match::gateway::ChannelEventPublisher;
use vibe_match::metrics::MetricsCollector;
use vibe_match::types::{FindPartnerRequest, Preferences};

/// A complete chat system wired to an in-process publisher
pub struct TestSystem {
    pub manager: Arc<ChatManager>,
    pub publisher: Arc<ChannelEventPublisher>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestSystem {
    pub fn new() -> Self {
        Self::with_config(MatchingConfig::default())
    }

    pub fn with_config(config: MatchingConfig) -> Self {
        let publisher = Arc::new(ChannelEventPublisher::new());
        let metrics = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        let manager = Arc::new(ChatManager::with_components(
            MatchingEngine::new(config),
            ContentFilter::default(),
            publisher.clone(),
            metrics.clone(),
        ));

        Self {
            manager,
            publisher,
            metrics,
        }
    }

    /// Attach and register a client the way the gateway does on connect
    pub async fn connect(&self, id: &str) -> TestClient {
        let rx = self.publisher.attach(id).expect("Failed to attach client");
        assert!(self.manager.register_connection(id).await.unwrap());
        TestClient {
            id: id.to_string(),
            rx,
        }
    }
}

/// Receiving end of one simulated socket
pub struct TestClient {
    pub id: String,
    rx: UnboundedReceiver<ServerEvent>,
}

impl TestClient {
    /// Every event delivered since the last drain
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Event names delivered since the last drain
    pub fn names(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(|event| event.name()).collect()
    }
}

/// Free search with the given interests
pub fn request(interests: &[&str]) -> FindPartnerRequest {
    FindPartnerRequest::with_interests(interests.iter().copied())
}

/// Premium search with optional gender and country preferences
pub fn premium_request(
    interests: &[&str],
    gender: Option<&str>,
    country: Option<&str>,
) -> FindPartnerRequest {
    FindPartnerRequest {
        preferences: Some(Preferences {
            gender: gender.map(str::to_string),
            nationality: None,
            country: country.map(str::to_string),
        }),
        is_premium: true,
        ..request(interests)
    }
}
