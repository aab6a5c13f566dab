//! Waiting queues for connections that are searching for a partner
//!
//! Each queue keeps insertion order and holds at most one entry per connection.
//! An entry is a snapshot of the request taken when the search started.

use crate::types::{ConnectionId, FindPartnerRequest, Preferences, QueueKind};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Snapshot of a searching connection's matching attributes
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingEntry {
    pub connection_id: ConnectionId,
    pub interests: Vec<String>,
    pub preferences: Option<Preferences>,
    pub is_premium: bool,
    pub enqueued_at: DateTime<Utc>,
}

impl WaitingEntry {
    pub fn from_request(connection_id: impl Into<ConnectionId>, request: &FindPartnerRequest) -> Self {
        Self {
            connection_id: connection_id.into(),
            interests: request.normalized_interests(),
            preferences: request.preferences.clone(),
            is_premium: request.is_premium,
            enqueued_at: current_timestamp(),
        }
    }

    /// Queue this entry belongs on
    pub fn target_queue(&self) -> QueueKind {
        if self.is_premium || self.preferences.is_some() {
            QueueKind::Constrained
        } else {
            QueueKind::Default
        }
    }
}

/// FIFO list of waiting entries
#[derive(Debug, Clone)]
pub struct MatchQueue {
    kind: QueueKind,
    entries: VecDeque<WaitingEntry>,
}

impl MatchQueue {
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            entries: VecDeque::new(),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaitingEntry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&WaitingEntry> {
        self.entries.get(index)
    }

    pub fn position(&self, connection_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.connection_id == connection_id)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.position(connection_id).is_some()
    }

    /// Append an entry. An existing entry for the same connection keeps its
    /// position and has its snapshot replaced; returns false in that case.
    pub fn push(&mut self, entry: WaitingEntry) -> bool {
        match self.position(&entry.connection_id) {
            Some(index) => {
                self.entries[index] = entry;
                false
            }
            None => {
                self.entries.push_back(entry);
                true
            }
        }
    }

    pub fn remove(&mut self, connection_id: &str) -> Option<WaitingEntry> {
        let index = self.position(connection_id)?;
        self.entries.remove(index)
    }

    pub fn take(&mut self, index: usize) -> Option<WaitingEntry> {
        self.entries.remove(index)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.entries
            .iter()
            .map(|entry| entry.connection_id.clone())
            .collect()
    }
}

/// The default and constrained queues
#[derive(Debug, Clone)]
pub struct MatchQueues {
    default: MatchQueue,
    constrained: MatchQueue,
}

impl Default for MatchQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchQueues {
    pub fn new() -> Self {
        Self {
            default: MatchQueue::new(QueueKind::Default),
            constrained: MatchQueue::new(QueueKind::Constrained),
        }
    }

    pub fn queue(&self, kind: QueueKind) -> &MatchQueue {
        match kind {
            QueueKind::Default => &self.default,
            QueueKind::Constrained => &self.constrained,
        }
    }

    pub fn queue_mut(&mut self, kind: QueueKind) -> &mut MatchQueue {
        match kind {
            QueueKind::Default => &mut self.default,
            QueueKind::Constrained => &mut self.constrained,
        }
    }

    /// Place an entry on `kind`, dropping any entry the connection holds on the other queue
    pub fn enqueue(&mut self, kind: QueueKind, entry: WaitingEntry) -> bool {
        let other = match kind {
            QueueKind::Default => QueueKind::Constrained,
            QueueKind::Constrained => QueueKind::Default,
        };
        self.queue_mut(other).remove(&entry.connection_id);
        self.queue_mut(kind).push(entry)
    }

    /// Remove the connection from every queue. Returns the queues it was found on.
    pub fn remove(&mut self, connection_id: &str) -> Vec<QueueKind> {
        [QueueKind::Default, QueueKind::Constrained]
            .into_iter()
            .filter(|kind| self.queue_mut(*kind).remove(connection_id).is_some())
            .collect()
    }

    pub fn location(&self, connection_id: &str) -> Option<QueueKind> {
        [QueueKind::Default, QueueKind::Constrained]
            .into_iter()
            .find(|kind| self.queue(*kind).contains(connection_id))
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.location(connection_id).is_some()
    }

    pub fn total_len(&self) -> usize {
        self.default.len() + self.constrained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Preferences;

    fn entry(id: &str, interests: &[&str]) -> WaitingEntry {
        WaitingEntry::from_request(id, &FindPartnerRequest::with_interests(interests.to_vec()))
    }

    #[test]
    fn test_target_queue_selection() {
        assert_eq!(entry("a", &[]).target_queue(), QueueKind::Default);
        assert_eq!(entry("a", &["music"]).target_queue(), QueueKind::Default);

        let premium = WaitingEntry::from_request(
            "b",
            &FindPartnerRequest {
                is_premium: true,
                ..Default::default()
            },
        );
        assert_eq!(premium.target_queue(), QueueKind::Constrained);

        let with_preferences = WaitingEntry::from_request(
            "c",
            &FindPartnerRequest {
                preferences: Some(Preferences::default()),
                ..Default::default()
            },
        );
        assert_eq!(with_preferences.target_queue(), QueueKind::Constrained);
    }

    #[test]
    fn test_push_is_idempotent_and_keeps_position() {
        let mut queue = MatchQueue::new(QueueKind::Default);
        assert!(queue.push(entry("a", &[])));
        assert!(queue.push(entry("b", &[])));
        assert!(!queue.push(entry("a", &["music"])));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.connection_ids(), vec!["a", "b"]);
        assert_eq!(queue.get(0).unwrap().interests, vec!["music"]);
    }

    #[test]
    fn test_enqueue_moves_between_queues() {
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("a", &[]));
        assert_eq!(queues.location("a"), Some(QueueKind::Default));

        queues.enqueue(QueueKind::Constrained, entry("a", &["music"]));
        assert_eq!(queues.location("a"), Some(QueueKind::Constrained));
        assert!(queues.queue(QueueKind::Default).is_empty());
        assert_eq!(queues.total_len(), 1);
    }

    #[test]
    fn test_remove_from_all_queues() {
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("a", &[]));
        queues.enqueue(QueueKind::Default, entry("b", &[]));

        assert_eq!(queues.remove("a"), vec![QueueKind::Default]);
        assert!(queues.remove("a").is_empty());
        assert!(!queues.contains("a"));
        assert!(queues.contains("b"));
    }
}
