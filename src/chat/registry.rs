//! Connection registry
//!
//! Tracks every live connection together with its pairing state and the
//! matching attributes from its latest search.

use crate::types::{ConnectionId, Preferences, RoomId};
use crate::utils::current_timestamp;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Pairing state derived from a connection's fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Searching,
    Paired,
}

/// A live client session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    pub room_id: Option<RoomId>,
    pub is_searching: bool,
    pub interests: Vec<String>,
    pub is_premium: bool,
    pub preferences: Option<Preferences>,
    pub vibe_coins: u64,
    pub last_daily_reward: Option<NaiveDate>,
}

impl Connection {
    pub fn new(id: impl Into<ConnectionId>) -> Self {
        Self {
            id: id.into(),
            connected_at: current_timestamp(),
            room_id: None,
            is_searching: false,
            interests: Vec::new(),
            is_premium: false,
            preferences: None,
            vibe_coins: 0,
            last_daily_reward: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.room_id.is_some() {
            ConnectionState::Paired
        } else if self.is_searching {
            ConnectionState::Searching
        } else {
            ConnectionState::Idle
        }
    }

    /// Return to idle without touching matching attributes
    pub fn reset(&mut self) {
        self.room_id = None;
        self.is_searching = false;
    }
}

/// All connections known to the service, keyed by connection id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh idle connection. Returns false if the id is already present,
    /// in which case the existing record is left untouched.
    pub fn register(&mut self, connection_id: &str) -> bool {
        if self.connections.contains_key(connection_id) {
            return false;
        }
        self.connections
            .insert(connection_id.to_string(), Connection::new(connection_id));
        true
    }

    pub fn get(&self, connection_id: &str) -> Option<&Connection> {
        self.connections.get(connection_id)
    }

    pub fn get_mut(&mut self, connection_id: &str) -> Option<&mut Connection> {
        self.connections.get_mut(connection_id)
    }

    pub fn remove(&mut self, connection_id: &str) -> Option<Connection> {
        self.connections.remove(connection_id)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    /// Number of connections currently in the given state
    pub fn count_in_state(&self, state: ConnectionState) -> usize {
        self.connections
            .values()
            .filter(|connection| connection.state() == state)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_register_creates_idle_connection() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.register("c1"));

        let connection = registry.get("c1").unwrap();
        assert_eq!(connection.state(), ConnectionState::Idle);
        assert!(connection.room_id.is_none());
        assert!(!connection.is_searching);
        assert!(connection.interests.is_empty());
        assert_eq!(connection.vibe_coins, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_twice_keeps_existing_record() {
        let mut registry = ConnectionRegistry::new();
        registry.register("c1");
        registry.get_mut("c1").unwrap().is_searching = true;

        assert!(!registry.register("c1"));
        assert!(registry.get("c1").unwrap().is_searching);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_connection_state_transitions() {
        let mut connection = Connection::new("c1");
        connection.is_searching = true;
        assert_eq!(connection.state(), ConnectionState::Searching);

        connection.is_searching = false;
        connection.room_id = Some(Uuid::new_v4());
        assert_eq!(connection.state(), ConnectionState::Paired);

        connection.interests = vec!["music".to_string()];
        connection.reset();
        assert_eq!(connection.state(), ConnectionState::Idle);
        assert_eq!(connection.interests, vec!["music"]);
    }

    #[test]
    fn test_remove_and_counts() {
        let mut registry = ConnectionRegistry::new();
        registry.register("a");
        registry.register("b");
        registry.get_mut("b").unwrap().is_searching = true;

        assert_eq!(registry.count_in_state(ConnectionState::Searching), 1);
        assert_eq!(registry.count_in_state(ConnectionState::Idle), 1);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(!registry.contains("a"));
        assert_eq!(registry.len(), 1);
    }
}
