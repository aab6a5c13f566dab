//! Chat manager orchestrating searches, rooms and relays
//!
//! All registry, queue and room mutations happen under one async mutex, and
//! the lock is held while the resulting events are handed to the publisher.
//! Every client intent is therefore applied atomically and in arrival order.

use crate::chat::filter::ContentFilter;
use crate::chat::matching::{MatchingEngine, MatchingResult};
use crate::chat::queue::{MatchQueues, WaitingEntry};
use crate::chat::registry::{Connection, ConnectionRegistry, ConnectionState};
use crate::chat::room::Room;
use crate::error::Result;
use crate::gateway::messages::ServerEvent;
use crate::gateway::publisher::EventPublisher;
use crate::metrics::MetricsCollector;
use crate::types::{
    ChatMessage, ConnectionId, FindPartnerRequest, LeaveReason, MatchMetadata, QueueKind, RoomId,
    Signal, UserCounts,
};
use crate::utils::{current_timestamp, generate_message_id, partner_label};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Statistics about chat manager operations
#[derive(Debug, Clone, Default)]
pub struct ChatManagerStats {
    /// Total connections registered
    pub connections_total: u64,
    /// Total rooms created
    pub rooms_created: u64,
    /// Total rooms torn down, for any reason
    pub rooms_closed: u64,
    /// Rooms torn down by the stale sweep
    pub rooms_swept: u64,
    /// Matches whose partner came from the default queue
    pub matches_default: u64,
    /// Matches whose partner came from the constrained queue
    pub matches_constrained: u64,
    /// Chat messages relayed
    pub messages_relayed: u64,
    /// Call-setup signals relayed
    pub signals_relayed: u64,
    /// Current number of registered connections
    pub active_connections: usize,
    /// Connections currently in a room
    pub paired_connections: usize,
    /// Current number of open rooms
    pub active_rooms: usize,
    /// Connections waiting on the default queue
    pub waiting_default: usize,
    /// Connections waiting on the constrained queue
    pub waiting_constrained: usize,
}

#[derive(Default)]
struct ChatState {
    registry: ConnectionRegistry,
    queues: MatchQueues,
    rooms: HashMap<RoomId, Room>,
    stats: ChatManagerStats,
}

impl ChatState {
    fn refresh_stats(&mut self) {
        self.stats.active_connections = self.registry.len();
        self.stats.paired_connections = self.registry.count_in_state(ConnectionState::Paired);
        self.stats.active_rooms = self.rooms.len();
        self.stats.waiting_default = self.queues.queue(QueueKind::Default).len();
        self.stats.waiting_constrained = self.queues.queue(QueueKind::Constrained).len();
    }
}

/// The chat manager
#[derive(Clone)]
pub struct ChatManager {
    /// Registry, queues, rooms and counters behind one lock
    state: Arc<Mutex<ChatState>>,
    /// Partner selection
    engine: Arc<MatchingEngine>,
    /// Banned-word masking for relayed messages
    filter: Arc<ContentFilter>,
    /// Outbound event delivery
    event_publisher: Arc<dyn EventPublisher>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
}

impl ChatManager {
    /// Create a new chat manager with default matching and filtering
    pub fn new(event_publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        let metrics_collector = Arc::new(MetricsCollector::new()?);
        Ok(Self::with_metrics(event_publisher, metrics_collector))
    }

    /// Create a new chat manager with metrics collector
    pub fn with_metrics(
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self::with_components(
            MatchingEngine::default(),
            ContentFilter::default(),
            event_publisher,
            metrics_collector,
        )
    }

    /// Create with a custom engine, filter and metrics
    pub fn with_components(
        engine: MatchingEngine,
        filter: ContentFilter,
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChatState::default())),
            engine: Arc::new(engine),
            filter: Arc::new(filter),
            event_publisher,
            metrics_collector,
        }
    }

    /// Register a newly accepted connection as idle
    pub async fn register_connection(&self, connection_id: &str) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !state.registry.register(connection_id) {
            warn!("Connection '{}' is already registered", connection_id);
            return Ok(false);
        }

        state.stats.connections_total += 1;
        state.refresh_stats();
        self.metrics_collector.record_connection_opened();

        info!(
            "Connection registered - id: '{}', connected: {}",
            connection_id, state.stats.active_connections
        );
        Ok(true)
    }

    /// Handle a findPartner intent. Returns the new room id when a partner was found.
    pub async fn find_partner(
        &self,
        connection_id: &str,
        request: FindPartnerRequest,
    ) -> Result<Option<RoomId>> {
        let timer = self.metrics_collector.start_timer();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(connection) = state.registry.get_mut(connection_id) else {
            debug!("Ignoring findPartner from unknown connection '{}'", connection_id);
            return Ok(None);
        };
        if let Some(room_id) = connection.room_id {
            debug!(
                "Ignoring findPartner from '{}' - already in room {}",
                connection_id, room_id
            );
            return Ok(None);
        }

        let requester = WaitingEntry::from_request(connection_id, &request);
        connection.interests = requester.interests.clone();
        connection.is_premium = requester.is_premium;
        connection.preferences = requester.preferences.clone();
        connection.is_searching = true;

        info!(
            "Partner search - id: '{}', interests: {:?}, premium: {}, preferences: {}",
            connection_id,
            requester.interests,
            requester.is_premium,
            requester.preferences.is_some()
        );

        let has_interests = !requester.interests.is_empty();
        let outcome = match self.engine.find_match(&mut state.queues, requester) {
            MatchingResult::Matched(result) => {
                let partner_id = result.partner.connection_id.clone();
                if state.registry.contains(&partner_id) {
                    let metadata = has_interests.then(|| MatchMetadata {
                        score: result.score,
                        shared_interests: result.shared_interests.clone(),
                    });
                    let search_wait = (current_timestamp() - result.partner.enqueued_at)
                        .to_std()
                        .unwrap_or_default();
                    let room_id = self
                        .create_room_locked(
                            state,
                            &partner_id,
                            connection_id,
                            metadata,
                            Some(result.queue),
                            search_wait,
                        )
                        .await;
                    Some(room_id)
                } else {
                    warn!(
                        "Dropped queue entry for unregistered connection '{}'",
                        partner_id
                    );
                    let requester = WaitingEntry::from_request(connection_id, &request);
                    state.queues.enqueue(requester.target_queue(), requester);
                    self.deliver(connection_id, ServerEvent::Searching).await;
                    None
                }
            }
            MatchingResult::Enqueued(queue) => {
                debug!("Connection '{}' waiting on {} queue", connection_id, queue);
                self.deliver(connection_id, ServerEvent::Searching).await;
                None
            }
        };

        state.refresh_stats();
        self.metrics_collector.record_find_partner(timer.stop());
        Ok(outcome)
    }

    /// Pair two registered connections into a fresh room
    pub async fn create_room(
        &self,
        first: &str,
        second: &str,
        metadata: Option<MatchMetadata>,
    ) -> Result<Option<RoomId>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let idle = |id: &str| {
            state
                .registry
                .get(id)
                .is_some_and(|connection| connection.room_id.is_none())
        };
        if first == second || !idle(first) || !idle(second) {
            debug!("Cannot pair '{}' with '{}'", first, second);
            return Ok(None);
        }

        let room_id = self
            .create_room_locked(state, first, second, metadata, None, std::time::Duration::ZERO)
            .await;
        state.refresh_stats();
        Ok(Some(room_id))
    }

    async fn create_room_locked(
        &self,
        state: &mut ChatState,
        first: &str,
        second: &str,
        metadata: Option<MatchMetadata>,
        queue: Option<QueueKind>,
        search_wait: std::time::Duration,
    ) -> RoomId {
        let timer = self.metrics_collector.start_timer();
        let room = Room::new(first, second, metadata.clone());
        let room_id = room.id();

        for participant in [first, second] {
            if let Some(connection) = state.registry.get_mut(participant) {
                connection.room_id = Some(room_id);
                connection.is_searching = false;
            }
            state.queues.remove(participant);
        }
        state.rooms.insert(room_id, room);

        state.stats.rooms_created += 1;
        match queue {
            Some(QueueKind::Default) => state.stats.matches_default += 1,
            Some(QueueKind::Constrained) => state.stats.matches_constrained += 1,
            None => {}
        }

        for participant in [first, second] {
            if let Err(e) = self.event_publisher.join_room(room_id, participant).await {
                warn!(
                    "Failed to add '{}' to delivery group of room {}: {}",
                    participant, room_id, e
                );
            }
        }

        for participant in [first, second] {
            let event = ServerEvent::PartnerFound {
                room_id,
                match_score: metadata.as_ref().map(|m| m.score),
                shared_interests: metadata.as_ref().map(|m| m.shared_interests.clone()),
                partner_label: Some(partner_label()),
            };
            self.deliver(participant, event).await;
        }

        let score = metadata.as_ref().map(|m| m.score).unwrap_or(0);
        info!(
            "Room created - id: {}, participants: ['{}', '{}'], score: {}, queue: {}",
            room_id,
            first,
            second,
            score,
            queue.map(|q| q.to_string()).unwrap_or_else(|| "none".to_string())
        );

        self.metrics_collector
            .record_room_created(queue, score, search_wait);
        self.metrics_collector
            .record_room_operation("create", timer.stop());
        room_id
    }

    /// Relay a chat message to the sender's partner. Returns false when the sender is not paired.
    pub async fn relay_message(&self, sender_id: &str, text: &str) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(room_id) = state.registry.get(sender_id).and_then(|c| c.room_id) else {
            debug!("Ignoring message from unpaired connection '{}'", sender_id);
            return Ok(false);
        };
        let Some(room) = state.rooms.get_mut(&room_id) else {
            debug!("Ignoring message for missing room {}", room_id);
            return Ok(false);
        };

        let masked = self.filter.apply(text);
        let filtered = masked != text;
        let message = ChatMessage {
            id: generate_message_id(),
            message: masked,
            timestamp: current_timestamp(),
            sender_id: sender_id.to_string(),
        };
        room.push_message(message.clone());
        state.stats.messages_relayed += 1;

        debug!(
            "Relaying message {} in room {} from '{}' (filtered: {})",
            message.id, room_id, sender_id, filtered
        );

        if let Err(e) = self
            .event_publisher
            .send_to_room_except(room_id, sender_id, ServerEvent::MessageReceived(message))
            .await
        {
            warn!("Failed to relay message in room {}: {}", room_id, e);
        }
        self.metrics_collector.record_message_relayed(filtered);
        Ok(true)
    }

    /// Tell the sender's partner that the sender is typing
    pub async fn relay_typing(&self, sender_id: &str) -> Result<bool> {
        let guard = self.state.lock().await;

        let Some(room_id) = guard.registry.get(sender_id).and_then(|c| c.room_id) else {
            debug!("Ignoring typing from unpaired connection '{}'", sender_id);
            return Ok(false);
        };
        if !guard.rooms.contains_key(&room_id) {
            debug!("Ignoring typing for missing room {}", room_id);
            return Ok(false);
        }

        if let Err(e) = self
            .event_publisher
            .send_to_room_except(room_id, sender_id, ServerEvent::PartnerTyping)
            .await
        {
            warn!("Failed to relay typing in room {}: {}", room_id, e);
        }
        Ok(true)
    }

    /// Forward a call-setup signal to the sender's partner without inspecting it
    pub async fn relay_signal(&self, sender_id: &str, signal: Signal) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(room_id) = state.registry.get(sender_id).and_then(|c| c.room_id) else {
            debug!(
                "Ignoring {} from unpaired connection '{}'",
                signal.kind(),
                sender_id
            );
            return Ok(false);
        };
        if !state.rooms.contains_key(&room_id) {
            debug!("Ignoring {} for missing room {}", signal.kind(), room_id);
            return Ok(false);
        }

        let kind = signal.kind();
        debug!("Relaying {} in room {} from '{}'", kind, room_id, sender_id);
        if let Err(e) = self
            .event_publisher
            .send_to_room_except(room_id, sender_id, ServerEvent::from_signal(signal, sender_id))
            .await
        {
            warn!("Failed to relay {} in room {}: {}", kind, room_id, e);
        }

        state.stats.signals_relayed += 1;
        self.metrics_collector.record_signal_relayed(kind);
        Ok(true)
    }

    /// Voluntary leave: notify the partner, close the room, cancel any search
    pub async fn leave_chat(&self, connection_id: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !state.registry.contains(connection_id) {
            debug!("Ignoring leaveChat from unknown connection '{}'", connection_id);
            return Ok(());
        }

        self.leave_locked(state, connection_id, LeaveReason::UserQuit)
            .await;
        self.deliver(connection_id, ServerEvent::ChatEnded).await;
        state.refresh_stats();
        Ok(())
    }

    /// Skip the current partner. Returns false when the connection is not paired.
    pub async fn skip_partner(&self, connection_id: &str) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let paired = state
            .registry
            .get(connection_id)
            .is_some_and(|c| c.room_id.is_some());
        if !paired {
            debug!("Ignoring skipPartner from unpaired connection '{}'", connection_id);
            return Ok(false);
        }

        self.leave_locked(state, connection_id, LeaveReason::Skip)
            .await;
        self.deliver(connection_id, ServerEvent::SkipSuccess).await;
        state.refresh_stats();
        Ok(true)
    }

    /// Transport-level disconnect: notify the partner, close the room and forget the connection
    pub async fn disconnect(&self, connection_id: &str) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !state.registry.contains(connection_id) {
            debug!("Disconnect for unknown connection '{}'", connection_id);
            return Ok(false);
        }

        let room_id = self
            .leave_locked(state, connection_id, LeaveReason::Disconnect)
            .await;
        let connected_at = state
            .registry
            .remove(connection_id)
            .map(|c| c.connected_at);

        if let Err(e) = self.event_publisher.detach(connection_id).await {
            warn!("Failed to detach connection '{}': {}", connection_id, e);
        }

        state.refresh_stats();
        self.metrics_collector.record_connection_closed();

        let session_secs = connected_at
            .map(|at| (current_timestamp() - at).num_seconds())
            .unwrap_or(0);
        info!(
            "Connection disconnected - id: '{}', room: {:?}, session: {}s, connected: {}",
            connection_id, room_id, session_secs, state.stats.active_connections
        );
        Ok(true)
    }

    /// Close a room. `leaving` is excluded from delivery-group cleanup and is
    /// expected to be reset by its own leave path.
    pub async fn teardown(
        &self,
        room_id: RoomId,
        leaving: Option<&str>,
        reason: LeaveReason,
    ) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let removed = self.teardown_locked(state, room_id, leaving, reason).await;
        state.refresh_stats();
        Ok(removed)
    }

    /// Shared leave path. Returns the room the connection was in, if any.
    async fn leave_locked(
        &self,
        state: &mut ChatState,
        connection_id: &str,
        reason: LeaveReason,
    ) -> Option<RoomId> {
        let room_id = state.registry.get(connection_id).and_then(|c| c.room_id);

        if let Some(room_id) = room_id {
            let partner = state
                .rooms
                .get(&room_id)
                .and_then(|room| room.partner_of(connection_id).cloned());
            if let Some(partner) = partner {
                self.deliver(&partner, ServerEvent::PartnerLeft).await;
            }

            self.teardown_locked(state, room_id, Some(connection_id), reason)
                .await;
            if let Err(e) = self.event_publisher.leave_room(room_id, connection_id).await {
                warn!(
                    "Failed to remove '{}' from delivery group of room {}: {}",
                    connection_id, room_id, e
                );
            }
        }

        if let Some(connection) = state.registry.get_mut(connection_id) {
            connection.reset();
        }
        let dequeued = state.queues.remove(connection_id);
        if !dequeued.is_empty() {
            debug!(
                "Search cancelled for '{}' ({}), removed from {:?}",
                connection_id, reason, dequeued
            );
        }
        room_id
    }

    async fn teardown_locked(
        &self,
        state: &mut ChatState,
        room_id: RoomId,
        leaving: Option<&str>,
        reason: LeaveReason,
    ) -> bool {
        let timer = self.metrics_collector.start_timer();
        let Some(room) = state.rooms.remove(&room_id) else {
            debug!("Teardown of room {} skipped - already closed", room_id);
            return false;
        };

        for participant in room.participants() {
            if let Some(connection) = state.registry.get_mut(participant) {
                if connection.room_id == Some(room_id) {
                    connection.reset();
                }
            }
        }
        for participant in room.remaining(leaving) {
            if let Err(e) = self.event_publisher.leave_room(room_id, &participant).await {
                warn!(
                    "Failed to remove '{}' from delivery group of room {}: {}",
                    participant, room_id, e
                );
            }
        }

        state.stats.rooms_closed += 1;
        if reason == LeaveReason::Stale {
            state.stats.rooms_swept += 1;
        }

        info!(
            "Room closed - id: {}, reason: {}, messages: {}, age: {}s",
            room_id,
            reason,
            room.messages().len(),
            room.age(current_timestamp()).num_seconds()
        );

        self.metrics_collector.record_room_closed(reason);
        self.metrics_collector
            .record_room_operation("teardown", timer.stop());
        true
    }

    /// Close every room older than `max_age` without notifying participants
    pub async fn sweep_stale_rooms(&self, max_age: Duration) -> Result<usize> {
        self.sweep_stale_rooms_at(current_timestamp(), max_age).await
    }

    /// Stale sweep evaluated against an explicit clock reading
    pub async fn sweep_stale_rooms_at(&self, now: DateTime<Utc>, max_age: Duration) -> Result<usize> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let stale: Vec<RoomId> = state
            .rooms
            .values()
            .filter(|room| room.is_stale(now, max_age))
            .map(Room::id)
            .collect();

        for room_id in &stale {
            self.teardown_locked(state, *room_id, None, LeaveReason::Stale)
                .await;
        }
        state.refresh_stats();

        if !stale.is_empty() {
            info!(
                "Stale sweep closed {} rooms older than {}s",
                stale.len(),
                max_age.num_seconds()
            );
        }
        Ok(stale.len())
    }

    /// Current matching/connected counts
    pub async fn user_counts(&self) -> UserCounts {
        let guard = self.state.lock().await;
        let matching = guard.queues.total_len();
        UserCounts {
            matching,
            connected: guard.registry.len().saturating_sub(matching),
        }
    }

    /// Broadcast the current counts to every connection
    pub async fn broadcast_user_counts(&self) -> Result<UserCounts> {
        let guard = self.state.lock().await;
        let matching = guard.queues.total_len();
        let counts = UserCounts {
            matching,
            connected: guard.registry.len().saturating_sub(matching),
        };

        self.event_publisher
            .broadcast(ServerEvent::UserCounts(counts))
            .await?;
        Ok(counts)
    }

    /// Grant today's reward to every connection that has not received it yet
    pub async fn award_daily_rewards(&self, coins: u64) -> Result<usize> {
        self.award_daily_rewards_on(current_timestamp().date_naive(), coins)
            .await
    }

    /// Daily reward pass for an explicit UTC calendar day
    pub async fn award_daily_rewards_on(&self, today: NaiveDate, coins: u64) -> Result<usize> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut rewarded: Vec<ConnectionId> = Vec::new();
        for connection in state.registry.iter_mut() {
            if connection.last_daily_reward == Some(today) {
                continue;
            }
            connection.vibe_coins += coins;
            connection.last_daily_reward = Some(today);
            rewarded.push(connection.id.clone());
        }

        for connection_id in &rewarded {
            self.deliver(connection_id, ServerEvent::DailyReward { coins })
                .await;
        }

        if !rewarded.is_empty() {
            info!(
                "Daily rewards granted - connections: {}, coins: {}, day: {}",
                rewarded.len(),
                coins,
                today
            );
        }
        self.metrics_collector.record_daily_rewards(rewarded.len());
        Ok(rewarded.len())
    }

    /// Snapshot of manager statistics
    pub async fn get_stats(&self) -> Result<ChatManagerStats> {
        let mut guard = self.state.lock().await;
        guard.refresh_stats();
        Ok(guard.stats.clone())
    }

    /// Copy of a connection record
    pub async fn connection(&self, connection_id: &str) -> Option<Connection> {
        self.state.lock().await.registry.get(connection_id).cloned()
    }

    /// Copy of a room record
    pub async fn room(&self, room_id: RoomId) -> Option<Room> {
        self.state.lock().await.rooms.get(&room_id).cloned()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.state.lock().await.rooms.keys().copied().collect()
    }

    /// Connection ids waiting on a queue, in queue order
    pub async fn waiting(&self, queue: QueueKind) -> Vec<ConnectionId> {
        self.state.lock().await.queues.queue(queue).connection_ids()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    async fn deliver(&self, connection_id: &str, event: ServerEvent) {
        let name = event.name();
        if let Err(e) = self.event_publisher.send_to(connection_id, event).await {
            warn!("Failed to deliver {} to '{}': {}", name, connection_id, e);
        }
    }
}
