//! Two-party chat rooms

use crate::types::{ChatMessage, ConnectionId, MatchMetadata, RoomId};
use crate::utils::{current_timestamp, generate_room_id};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// An active pairing of exactly two connections with its message log
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    id: RoomId,
    participants: [ConnectionId; 2],
    created_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<MatchMetadata>,
}

impl Room {
    pub fn new(
        first: impl Into<ConnectionId>,
        second: impl Into<ConnectionId>,
        metadata: Option<MatchMetadata>,
    ) -> Self {
        Self {
            id: generate_room_id(),
            participants: [first.into(), second.into()],
            created_at: current_timestamp(),
            messages: Vec::new(),
            metadata,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn participants(&self) -> &[ConnectionId; 2] {
        &self.participants
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn metadata(&self) -> Option<&MatchMetadata> {
        self.metadata.as_ref()
    }

    pub fn has_participant(&self, connection_id: &str) -> bool {
        self.participants.iter().any(|p| p == connection_id)
    }

    /// The other participant, if `connection_id` is in this room
    pub fn partner_of(&self, connection_id: &str) -> Option<&ConnectionId> {
        match &self.participants {
            [a, b] if a == connection_id => Some(b),
            [a, b] if b == connection_id => Some(a),
            _ => None,
        }
    }

    /// Participants other than `leaving`; both when nobody is leaving
    pub fn remaining(&self, leaving: Option<&str>) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .filter(|p| Some(p.as_str()) != leaving)
            .cloned()
            .collect()
    }

    /// Append to the log. The log is never truncated while the room lives.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) > max_age
    }

    #[cfg(test)]
    pub(crate) fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.created_at = created_at;
    }
}
