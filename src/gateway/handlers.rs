//! Per-connection session handling
//!
//! Each accepted WebSocket gets a connection id, an outbound channel drained by
//! a writer task, and a read loop that feeds decoded intents to the chat manager.

use crate::chat::ChatManager;
use crate::error::Result;
use crate::gateway::messages::{ClientEvent, MessageUtils};
use crate::gateway::publisher::EventPublisher;
use crate::gateway::server::GatewayState;
use crate::utils::generate_connection_id;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Routes decoded client intents to chat manager operations
#[derive(Clone)]
pub struct EventDispatcher {
    chat_manager: Arc<ChatManager>,
}

impl EventDispatcher {
    pub fn new(chat_manager: Arc<ChatManager>) -> Self {
        Self { chat_manager }
    }

    /// Apply one intent on behalf of a connection
    pub async fn dispatch(&self, connection_id: &str, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::FindPartner(request) => {
                self.chat_manager.find_partner(connection_id, request).await?;
            }
            ClientEvent::SendMessage { message } => {
                self.chat_manager.relay_message(connection_id, &message).await?;
            }
            ClientEvent::Typing => {
                self.chat_manager.relay_typing(connection_id).await?;
            }
            ClientEvent::SkipPartner => {
                self.chat_manager.skip_partner(connection_id).await?;
            }
            ClientEvent::LeaveChat => {
                self.chat_manager.leave_chat(connection_id).await?;
            }
            ClientEvent::Signal(signal) => {
                self.chat_manager.relay_signal(connection_id, signal).await?;
            }
        }
        Ok(())
    }

    /// Decode and apply a raw text frame. Malformed frames are logged and dropped.
    pub async fn handle_frame(&self, connection_id: &str, text: &str) {
        let metrics = self.chat_manager.metrics_collector();

        let event = match MessageUtils::parse_client_event(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping frame from '{}': {}", connection_id, e);
                metrics.record_client_event("invalid", false);
                return;
            }
        };

        let name = event.name();
        debug!("Received {} from '{}'", name, connection_id);

        match self.dispatch(connection_id, event).await {
            Ok(()) => metrics.record_client_event(name, true),
            Err(e) => {
                warn!("Failed to handle {} from '{}': {}", name, connection_id, e);
                metrics.record_client_event(name, false);
            }
        }
    }
}

/// Drive one WebSocket session until the peer goes away
pub async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let connection_id = generate_connection_id();

    let outbound = match state.publisher.attach(&connection_id) {
        Ok(rx) => rx,
        Err(e) => {
            warn!("Failed to attach connection '{}': {}", connection_id, e);
            return;
        }
    };

    if let Err(e) = state.chat_manager.register_connection(&connection_id).await {
        warn!("Failed to register connection '{}': {}", connection_id, e);
        let _ = state.publisher.detach(&connection_id).await;
        return;
    }

    info!("WebSocket session opened - id: '{}'", connection_id);

    let (mut sender, mut receiver) = socket.split();

    let writer_id = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(outbound);
        while let Some(event) = events.next().await {
            let payload = match MessageUtils::encode_server_event(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode event for '{}': {}", writer_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                debug!("Socket closed while writing to '{}'", writer_id);
                break;
            }
        }
    });

    let dispatcher = EventDispatcher::new(state.chat_manager.clone());

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        dispatcher.handle_frame(&connection_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary frame from '{}'", connection_id);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket error on '{}': {}", connection_id, e);
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    if let Err(e) = state.chat_manager.disconnect(&connection_id).await {
        warn!("Failed to disconnect '{}': {}", connection_id, e);
    }
    // Covers sessions the manager no longer knew about
    if let Err(e) = state.publisher.detach(&connection_id).await {
        debug!("Failed to detach '{}': {}", connection_id, e);
    }
    writer.abort();

    info!("WebSocket session closed - id: '{}'", connection_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::messages::ServerEvent;
    use crate::gateway::publisher::MockEventPublisher;
    use crate::types::FindPartnerRequest;

    async fn dispatcher_with_mock() -> (EventDispatcher, Arc<ChatManager>, Arc<MockEventPublisher>) {
        let publisher = Arc::new(MockEventPublisher::new());
        let manager = Arc::new(ChatManager::new(publisher.clone()).unwrap());
        (EventDispatcher::new(manager.clone()), manager, publisher)
    }

    #[tokio::test]
    async fn test_frames_drive_a_full_conversation() {
        let (dispatcher, manager, publisher) = dispatcher_with_mock().await;
        manager.register_connection("alice").await.unwrap();
        manager.register_connection("bob").await.unwrap();

        dispatcher
            .handle_frame("alice", r#"{"event":"findPartner","data":{"interests":["music"]}}"#)
            .await;
        dispatcher
            .handle_frame("bob", r#"{"event":"findPartner","data":{"interests":["music"]}}"#)
            .await;

        let room_id = manager.connection("alice").await.unwrap().room_id;
        assert!(room_id.is_some());
        assert_eq!(manager.connection("bob").await.unwrap().room_id, room_id);

        dispatcher
            .handle_frame("alice", r#"{"event":"sendMessage","data":{"message":"hi"}}"#)
            .await;

        let received = publisher
            .get_sent_events()
            .into_iter()
            .filter(|(to, _)| to == "bob")
            .any(|(_, event)| matches!(event, ServerEvent::MessageReceived(ref m) if m.message == "hi"));
        assert!(received);

        dispatcher.handle_frame("bob", r#"{"event":"leaveChat"}"#).await;
        assert!(manager.connection("alice").await.unwrap().room_id.is_none());
        assert!(publisher.event_names_for("alice").contains(&"partnerLeft"));
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (dispatcher, manager, publisher) = dispatcher_with_mock().await;
        manager.register_connection("alice").await.unwrap();

        dispatcher.handle_frame("alice", "not json").await;
        dispatcher.handle_frame("alice", r#"{"event":"dance"}"#).await;

        assert!(publisher.get_sent_events().is_empty());
        assert!(manager.waiting(crate::types::QueueKind::Default).await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_typing_without_room_is_noop() {
        let (dispatcher, manager, publisher) = dispatcher_with_mock().await;
        manager.register_connection("alice").await.unwrap();

        dispatcher.dispatch("alice", ClientEvent::Typing).await.unwrap();
        dispatcher
            .dispatch("alice", ClientEvent::FindPartner(FindPartnerRequest::default()))
            .await
            .unwrap();

        assert_eq!(publisher.event_names_for("alice"), vec!["searching"]);
    }
}
