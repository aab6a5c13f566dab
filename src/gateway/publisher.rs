//! Outbound event delivery
//!
//! The chat core talks to clients only through [`EventPublisher`]. The
//! production implementation keeps one unbounded channel per connection plus
//! the delivery groups (one per room); a socket writer task drains each channel.

use crate::error::{ChatError, Result};
use crate::gateway::messages::ServerEvent;
use crate::types::{ConnectionId, RoomId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// Trait for delivering server events to connections
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver an event to a single connection
    async fn send_to(&self, connection_id: &str, event: ServerEvent) -> Result<()>;

    /// Deliver an event to every member of a room's delivery group except one.
    /// Returns the number of recipients reached.
    async fn send_to_room_except(
        &self,
        room_id: RoomId,
        except: &str,
        event: ServerEvent,
    ) -> Result<usize>;

    /// Deliver an event to every attached connection
    async fn broadcast(&self, event: ServerEvent) -> Result<usize>;

    /// Add a connection to a room's delivery group
    async fn join_room(&self, room_id: RoomId, connection_id: &str) -> Result<()>;

    /// Remove a connection from a room's delivery group
    async fn leave_room(&self, room_id: RoomId, connection_id: &str) -> Result<()>;

    /// Drop the connection's outbound channel and every group membership
    async fn detach(&self, connection_id: &str) -> Result<()>;
}

/// Channel-backed publisher used by the WebSocket gateway
#[derive(Debug, Default)]
pub struct ChannelEventPublisher {
    sessions: RwLock<HashMap<ConnectionId, UnboundedSender<ServerEvent>>>,
    groups: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
}

impl ChannelEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand back the receiving end of its outbound channel
    pub fn attach(&self, connection_id: &str) -> Result<UnboundedReceiver<ServerEvent>> {
        let (tx, rx) = unbounded_channel();
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| ChatError::InternalError {
                message: "Failed to acquire sessions lock".to_string(),
            })?;
        sessions.insert(connection_id.to_string(), tx);
        Ok(rx)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn group_members(&self, room_id: RoomId) -> Vec<ConnectionId> {
        self.groups
            .read()
            .ok()
            .and_then(|groups| groups.get(&room_id).map(|m| m.iter().cloned().collect()))
            .unwrap_or_default()
    }

    fn deliver(&self, connection_id: &str, event: ServerEvent) -> Result<()> {
        let sessions = self.sessions.read().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire sessions lock".to_string(),
        })?;
        let sender = sessions
            .get(connection_id)
            .ok_or_else(|| ChatError::DeliveryFailed {
                connection_id: connection_id.to_string(),
            })?;
        sender.send(event).map_err(|_| ChatError::DeliveryFailed {
            connection_id: connection_id.to_string(),
        })?;
        Ok(())
    }

    fn deliver_many(&self, recipients: &[ConnectionId], event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for recipient in recipients {
            match self.deliver(recipient, event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Dropping {} for '{}': {}", event.name(), recipient, e),
            }
        }
        delivered
    }
}

#[async_trait]
impl EventPublisher for ChannelEventPublisher {
    async fn send_to(&self, connection_id: &str, event: ServerEvent) -> Result<()> {
        debug!("Sending {} to '{}'", event.name(), connection_id);
        self.deliver(connection_id, event)
    }

    async fn send_to_room_except(
        &self,
        room_id: RoomId,
        except: &str,
        event: ServerEvent,
    ) -> Result<usize> {
        let recipients: Vec<ConnectionId> = self
            .group_members(room_id)
            .into_iter()
            .filter(|member| member != except)
            .collect();
        Ok(self.deliver_many(&recipients, &event))
    }

    async fn broadcast(&self, event: ServerEvent) -> Result<usize> {
        let recipients: Vec<ConnectionId> = {
            let sessions = self.sessions.read().map_err(|_| ChatError::InternalError {
                message: "Failed to acquire sessions lock".to_string(),
            })?;
            sessions.keys().cloned().collect()
        };
        Ok(self.deliver_many(&recipients, &event))
    }

    async fn join_room(&self, room_id: RoomId, connection_id: &str) -> Result<()> {
        let mut groups = self.groups.write().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire groups lock".to_string(),
        })?;
        groups
            .entry(room_id)
            .or_default()
            .insert(connection_id.to_string());
        Ok(())
    }

    async fn leave_room(&self, room_id: RoomId, connection_id: &str) -> Result<()> {
        let mut groups = self.groups.write().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire groups lock".to_string(),
        })?;
        if let Some(members) = groups.get_mut(&room_id) {
            members.remove(connection_id);
            if members.is_empty() {
                groups.remove(&room_id);
            }
        }
        Ok(())
    }

    async fn detach(&self, connection_id: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write().map_err(|_| ChatError::InternalError {
                message: "Failed to acquire sessions lock".to_string(),
            })?;
            sessions.remove(connection_id);
        }
        let mut groups = self.groups.write().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire groups lock".to_string(),
        })?;
        groups.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
        Ok(())
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    sent_events: std::sync::Mutex<Vec<(ConnectionId, ServerEvent)>>,
    groups: std::sync::Mutex<HashMap<RoomId, HashSet<ConnectionId>>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All deliveries as (recipient, event) pairs, in order
    pub fn get_sent_events(&self) -> Vec<(ConnectionId, ServerEvent)> {
        self.sent_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Event names delivered to one connection, in order
    pub fn event_names_for(&self, connection_id: &str) -> Vec<&'static str> {
        self.get_sent_events()
            .into_iter()
            .filter(|(recipient, _)| recipient == connection_id)
            .map(|(_, event)| event.name())
            .collect()
    }

    pub fn group_members(&self, room_id: RoomId) -> Vec<ConnectionId> {
        self.groups
            .lock()
            .ok()
            .and_then(|groups| groups.get(&room_id).map(|m| m.iter().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.sent_events.lock() {
            events.clear();
        }
    }

    fn record(&self, connection_id: &str, event: ServerEvent) {
        if let Ok(mut events) = self.sent_events.lock() {
            events.push((connection_id.to_string(), event));
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn send_to(&self, connection_id: &str, event: ServerEvent) -> Result<()> {
        self.record(connection_id, event);
        Ok(())
    }

    async fn send_to_room_except(
        &self,
        room_id: RoomId,
        except: &str,
        event: ServerEvent,
    ) -> Result<usize> {
        let recipients: Vec<ConnectionId> = self
            .group_members(room_id)
            .into_iter()
            .filter(|member| member != except)
            .collect();
        for recipient in &recipients {
            self.record(recipient, event.clone());
        }
        Ok(recipients.len())
    }

    async fn broadcast(&self, event: ServerEvent) -> Result<usize> {
        self.record("*", event);
        Ok(1)
    }

    async fn join_room(&self, room_id: RoomId, connection_id: &str) -> Result<()> {
        if let Ok(mut groups) = self.groups.lock() {
            groups
                .entry(room_id)
                .or_default()
                .insert(connection_id.to_string());
        }
        Ok(())
    }

    async fn leave_room(&self, room_id: RoomId, connection_id: &str) -> Result<()> {
        if let Ok(mut groups) = self.groups.lock() {
            if let Some(members) = groups.get_mut(&room_id) {
                members.remove(connection_id);
            }
            groups.retain(|_, members| !members.is_empty());
        }
        Ok(())
    }

    async fn detach(&self, connection_id: &str) -> Result<()> {
        if let Ok(mut groups) = self.groups.lock() {
            groups.retain(|_, members| {
                members.remove(connection_id);
                !members.is_empty()
            });
        }
        Ok(())
    }
}
